// Core delivery pipeline
pub mod delivery;
pub mod notification;
pub mod renderer;
pub mod transport;

// Scheduling front door
pub mod queue;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
pub mod testing;
