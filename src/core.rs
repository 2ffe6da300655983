//! # Core Context
//!
//! The shared services every stage and worker needs: the message unit registry, the event
//! notifier, the P-Mode lookup and the engine configuration. A [`Core`] is cheap to clone and
//! is handed to each component when it is constructed.

use crate::config::EngineConfig;
use crate::events::{EventHandlerFactoryRegistry, EventKind, EventNotifier, ProcessingEvent};
use crate::models::MessageUnitEntity;
use crate::pmode::{Leg, PModeLookup, ProcessingMode};
use crate::storage::{MessageUnitRegistry, StorageProvider};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct Core {
    registry: MessageUnitRegistry,
    notifier: EventNotifier,
    pmodes: Arc<dyn PModeLookup>,
    config: Arc<EngineConfig>,
}

impl Core {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn StorageProvider>,
        pmodes: Arc<dyn PModeLookup>,
        handler_factories: Arc<EventHandlerFactoryRegistry>,
    ) -> Self {
        let notifier = EventNotifier::new(
            handler_factories,
            Arc::clone(&pmodes),
            config.event_handlers.clone(),
        );
        Self {
            registry: MessageUnitRegistry::new(provider),
            notifier,
            pmodes,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &MessageUnitRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    pub fn pmodes(&self) -> &Arc<dyn PModeLookup> {
        &self.pmodes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The P-Mode governing the message unit, if it has one and it is still available
    pub fn pmode_of(&self, entity: &MessageUnitEntity) -> Option<Arc<ProcessingMode>> {
        let pmode_id = entity.pmode_id()?;
        let pmode = self.pmodes.resolve(pmode_id);
        if pmode.is_none() {
            warn!(
                pmode_id = %pmode_id,
                message_id = %entity.message_id(),
                "P-Mode of message unit is not available"
            );
        }
        pmode
    }

    /// The leg of the P-Mode the message unit is exchanged on
    pub fn leg_of(&self, entity: &MessageUnitEntity) -> Option<Leg> {
        self.pmode_of(entity)
            .and_then(|pmode| pmode.leg(entity.leg_label()).cloned())
    }

    /// Raise an event about the message unit
    pub async fn raise(&self, kind: EventKind, subject: &MessageUnitEntity) {
        self.notifier
            .raise_event(ProcessingEvent::new(kind, subject))
            .await;
    }
}
