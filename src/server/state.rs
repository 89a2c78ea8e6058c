use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::delivery::DeliveryEngine;
use crate::error::{AppError, Result};
use crate::queue::DeliveryQueue;
use crate::renderer::RendererRegistry;
use crate::transport::{ResendTransport, Transport};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub renderers: Arc<RendererRegistry>,
    pub queue: Arc<DeliveryQueue>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        renderers: Arc<RendererRegistry>,
        queue: Arc<DeliveryQueue>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            renderers,
            queue,
            started_at: Instant::now(),
        }
    }

    /// Wire the built-in renderers, the Resend transport, the engine and
    /// the queue. Spawns the queue dispatcher, so call from within a runtime.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(
            ResendTransport::new(&settings.resend)
                .map_err(|e| AppError::Internal(e.to_string()))?,
        );

        Self::with_transport(settings, transport)
    }

    /// Same as [`AppState::from_settings`] with a caller-supplied transport
    pub fn with_transport(settings: Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        let renderers = Arc::new(
            RendererRegistry::builtin().map_err(|e| AppError::Internal(e.to_string()))?,
        );

        let engine = DeliveryEngine::new(&settings.delivery, renderers.clone(), transport)
            .map_err(|e| AppError::Internal(format!("Invalid delivery settings: {}", e)))?;

        let queue = DeliveryQueue::start(engine, settings.queue.clone());

        Ok(Self::new(settings, renderers, queue))
    }
}
