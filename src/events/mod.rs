//! # Processing Events
//!
//! Events raised by the processing stages and the notifier that passes them to the configured
//! event handlers.

pub mod handler;
pub mod logging_handler;
pub mod notifier;
pub mod types;

pub use handler::{EventHandler, EventHandlerConfig, EventHandlerFactory, EventHandlerFactoryRegistry};
pub use logging_handler::{LoggingEventHandlerFactory, LOG_HANDLER_FACTORY};
pub use notifier::{EventNotifier, HandlerTier, NotificationSummary};
pub use types::{EventKind, ProcessingEvent};
