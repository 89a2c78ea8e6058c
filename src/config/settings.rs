use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub resend: ResendConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// When set, `/api/v1/*` requires a matching `X-API-Key` header
    pub key: Option<String>,
}

/// Retry, deadline and classification settings for the delivery engine
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default)]
    pub jitter_factor: f64,
    /// Transport error codes forced to transient
    #[serde(default)]
    pub transient_codes: Vec<String>,
    /// Transport error codes forced to permanent
    #[serde(default)]
    pub permanent_codes: Vec<String>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_cap_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    600_000 // 10 minutes
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResendConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_resend_base_url")]
    pub base_url: String,
    #[serde(default = "default_resend_from")]
    pub from: String,
    /// Per-call HTTP timeout
    #[serde(default = "default_resend_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_resend_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_resend_from() -> String {
    "Finance App <onboarding@resend.dev>".to_string()
}

fn default_resend_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Jobs buffered before enqueue reports the queue as full
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Deliveries running concurrently
    #[serde(default = "default_queue_workers")]
    pub workers: usize,
    /// How long finished job records stay queryable
    #[serde(default = "default_result_ttl")]
    pub result_ttl_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Grace period for in-flight jobs on shutdown
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_queue_workers() -> usize {
    16
}

fn default_result_ttl() -> u64 {
    3600 // 1 hour
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

fn default_drain_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // NOTIFY_SERVER__PORT, NOTIFY_DELIVERY__MAX_ATTEMPTS, ...
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("delivery.transient_codes")
                    .with_list_parse_key("delivery.permanent_codes"),
            )
            // Variable name used by existing deployments
            .set_override_option("resend.api_key", env::var("RESEND_API").ok())?
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize from an already-built configuration
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            cap_delay_ms: default_cap_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            jitter_factor: 0.0,
            transient_codes: vec![],
            permanent_codes: vec![],
        }
    }
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_resend_base_url(),
            from: default_resend_from(),
            timeout_secs: default_resend_timeout_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            workers: default_queue_workers(),
            result_ttl_seconds: default_result_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
