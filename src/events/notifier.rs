//! # Event Notifier
//!
//! Passes processing events to the configured handlers. Handler configurations are consulted
//! in three tiers: the leg of the subject's P-Mode, the P-Mode itself and finally the global
//! configuration. A handler configured not to continue processing stops the event after it
//! handled it successfully, including for all later tiers.
//!
//! Handler failures never reach the caller. Errors and panics from factory initialization,
//! handler creation or event handling are logged and the next handler is tried.

use super::handler::{EventHandlerConfig, EventHandlerFactoryRegistry};
use super::types::ProcessingEvent;
use crate::pmode::PModeLookup;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Level on which a set of event handlers is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerTier {
    Leg,
    PMode,
    Global,
}

/// What happened to a raised event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationSummary {
    /// Handlers that completed without error
    pub handled: usize,
    /// Handlers that could not be created or failed while handling
    pub failed: usize,
    /// Tier whose handler stopped further processing
    pub stopped_at: Option<HandlerTier>,
    /// The event had no subject and was ignored
    pub dropped: bool,
}

enum HandlerResult {
    Handled,
    Failed,
}

#[derive(Clone)]
pub struct EventNotifier {
    factories: Arc<EventHandlerFactoryRegistry>,
    pmodes: Arc<dyn PModeLookup>,
    global_handlers: Arc<Vec<EventHandlerConfig>>,
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("factories", &self.factories)
            .field("global_handlers", &self.global_handlers.len())
            .finish()
    }
}

impl EventNotifier {
    pub fn new(
        factories: Arc<EventHandlerFactoryRegistry>,
        pmodes: Arc<dyn PModeLookup>,
        global_handlers: Vec<EventHandlerConfig>,
    ) -> Self {
        for config in &global_handlers {
            if !factories.contains(&config.factory) {
                warn!(
                    factory = %config.factory,
                    "Global event handler refers to an unregistered factory and will be skipped"
                );
            }
        }
        Self {
            factories,
            pmodes,
            global_handlers: Arc::new(global_handlers),
        }
    }

    /// Raise an event, running all matching handlers to completion before returning
    pub async fn raise_event(&self, event: ProcessingEvent) -> NotificationSummary {
        let mut summary = NotificationSummary::default();

        let Some(subject) = event.subject() else {
            warn!(
                event = event.name(),
                event_id = %event.id,
                "An event was raised without reference to a message unit, ignoring it"
            );
            summary.dropped = true;
            return summary;
        };

        trace!(
            event = event.name(),
            event_id = %event.id,
            message_id = %subject.message_id(),
            unit_type = %subject.unit_type(),
            "Event raised"
        );

        // Collect the configurations up front so no lock is held while handlers run
        let mut tiers = Vec::with_capacity(3);
        if let Some(pmode_id) = subject.pmode_id() {
            match self.pmodes.resolve(pmode_id) {
                Some(pmode) => {
                    if let Some(leg) = pmode.leg(subject.leg_label()) {
                        tiers.push((HandlerTier::Leg, leg.event_handlers.clone()));
                    }
                    tiers.push((HandlerTier::PMode, pmode.event_handlers.clone()));
                }
                None => error!(
                    pmode_id = %pmode_id,
                    message_id = %subject.message_id(),
                    "The P-Mode of the message unit is not available, only global event handlers apply"
                ),
            }
        }
        tiers.push((HandlerTier::Global, self.global_handlers.as_ref().clone()));

        for (tier, configs) in tiers {
            if !self.handle_in_tier(tier, &configs, &event, &mut summary).await {
                summary.stopped_at = Some(tier);
                debug!(
                    event = event.name(),
                    event_id = %event.id,
                    tier = ?tier,
                    "No further processing of event needed"
                );
                break;
            }
        }

        summary
    }

    /// Returns whether processing should continue with the next tier
    async fn handle_in_tier(
        &self,
        tier: HandlerTier,
        configs: &[EventHandlerConfig],
        event: &ProcessingEvent,
        summary: &mut NotificationSummary,
    ) -> bool {
        for config in configs {
            let should_handle = config.should_handle(event);
            trace!(
                factory = %config.factory,
                tier = ?tier,
                event = event.name(),
                should_handle,
                "Checking event handler"
            );
            if !should_handle {
                continue;
            }

            match self.run_handler(config, event).await {
                HandlerResult::Handled => {
                    summary.handled += 1;
                    debug!(
                        event = event.name(),
                        event_id = %event.id,
                        factory = %config.factory,
                        "Event handled"
                    );
                    if !config.continue_processing {
                        return false;
                    }
                }
                HandlerResult::Failed => summary.failed += 1,
            }
        }
        true
    }

    async fn run_handler(&self, config: &EventHandlerConfig, event: &ProcessingEvent) -> HandlerResult {
        let Some(mut factory) = self.factories.create_factory(&config.factory) else {
            error!(
                factory = %config.factory,
                "Could not create event handler factory, identifier is not registered"
            );
            return HandlerResult::Failed;
        };

        let attempt = async {
            factory.init(&config.settings)?;
            let handler = factory.create_handler()?;
            handler.handle_event(event).await
        };

        match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(())) => HandlerResult::Handled,
            Ok(Err(e)) => {
                warn!(
                    event = event.name(),
                    event_id = %event.id,
                    factory = %config.factory,
                    error = %e,
                    "An error occurred when the event was processed by the handler"
                );
                HandlerResult::Failed
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(
                    event = event.name(),
                    event_id = %event.id,
                    factory = %config.factory,
                    panic = %reason,
                    "Event handler panicked while processing the event"
                );
                HandlerResult::Failed
            }
        }
    }
}

/// Best effort description of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
