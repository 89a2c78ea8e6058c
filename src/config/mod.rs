mod settings;

pub use settings::{
    ApiConfig, DeliveryConfig, LogFormat, LoggingConfig, QueueConfig, ResendConfig,
    ServerConfig, Settings,
};
