use super::handler::{EventHandler, EventHandlerFactory};
use super::types::ProcessingEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::Level;

/// Identifier of the built-in factory writing events to the log
pub const LOG_HANDLER_FACTORY: &str = "log";

/// Factory for [`LoggingEventHandler`]. Setting `level` selects the log level (default `info`).
#[derive(Debug, Clone)]
pub struct LoggingEventHandlerFactory {
    level: Level,
}

impl Default for LoggingEventHandlerFactory {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl EventHandlerFactory for LoggingEventHandlerFactory {
    fn init(&mut self, settings: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(level) = settings.get("level") {
            self.level = level
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid log level '{level}'"))?;
        }
        Ok(())
    }

    fn create_handler(&self) -> anyhow::Result<Box<dyn EventHandler>> {
        Ok(Box::new(LoggingEventHandler { level: self.level }))
    }
}

/// Writes every event it gets to the log
#[derive(Debug)]
pub struct LoggingEventHandler {
    level: Level,
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &ProcessingEvent) -> anyhow::Result<()> {
        let message_id = event.subject().map(|s| s.message_id()).unwrap_or("-");
        let details = serde_json::to_string(&event.kind)?;
        match self.level {
            Level::ERROR => tracing::error!(event_id = %event.id, event = event.name(), message_id, details = %details, "📣 PROCESSING_EVENT"),
            Level::WARN => tracing::warn!(event_id = %event.id, event = event.name(), message_id, details = %details, "📣 PROCESSING_EVENT"),
            Level::INFO => tracing::info!(event_id = %event.id, event = event.name(), message_id, details = %details, "📣 PROCESSING_EVENT"),
            Level::DEBUG => tracing::debug!(event_id = %event.id, event = event.name(), message_id, details = %details, "📣 PROCESSING_EVENT"),
            _ => tracing::trace!(event_id = %event.id, event = event.name(), message_id, details = %details, "📣 PROCESSING_EVENT"),
        }
        Ok(())
    }
}
