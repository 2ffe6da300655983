//! # Event Handlers
//!
//! Event handlers are created per event by a factory. Factories are looked up by identifier in
//! the [`EventHandlerFactoryRegistry`], which the embedding application fills at startup.

use super::types::ProcessingEvent;
use crate::models::MessageUnitType;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Processes a single event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &ProcessingEvent) -> anyhow::Result<()>;
}

/// Creates event handlers from the settings of an [`EventHandlerConfig`]
pub trait EventHandlerFactory: Send + Sync {
    fn init(&mut self, settings: &HashMap<String, String>) -> anyhow::Result<()>;

    fn create_handler(&self) -> anyhow::Result<Box<dyn EventHandler>>;
}

type FactoryConstructor = Arc<dyn Fn() -> Box<dyn EventHandlerFactory> + Send + Sync>;

/// Maps factory identifiers to factory constructors
pub struct EventHandlerFactoryRegistry {
    constructors: RwLock<HashMap<String, FactoryConstructor>>,
}

impl std::fmt::Debug for EventHandlerFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlerFactoryRegistry")
            .field("factories", &self.identifiers())
            .finish()
    }
}

impl Default for EventHandlerFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandlerFactoryRegistry {
    /// Registry containing only the built-in `log` factory
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(
            super::logging_handler::LOG_HANDLER_FACTORY,
            super::logging_handler::LoggingEventHandlerFactory::default,
        );
        registry
    }

    pub fn empty() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory constructor under the given identifier, replacing any earlier one
    pub fn register<F, C>(&self, identifier: impl Into<String>, constructor: C)
    where
        F: EventHandlerFactory + 'static,
        C: Fn() -> F + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        debug!(factory = %identifier, "Registering event handler factory");
        let boxed: FactoryConstructor = Arc::new(move || Box::new(constructor()));
        self.constructors.write().insert(identifier, boxed);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.constructors.read().contains_key(identifier)
    }

    /// Instantiate a new, uninitialized factory
    pub fn create_factory(&self, identifier: &str) -> Option<Box<dyn EventHandlerFactory>> {
        let constructor = self.constructors.read().get(identifier).cloned();
        constructor.map(|c| c())
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.constructors.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Configuration of an event handler on the leg, P-Mode or global level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventHandlerConfig {
    /// Identifier of the factory in the factory registry
    pub factory: String,
    /// Names of the events to handle; empty handles all
    pub handled_events: Vec<String>,
    /// Message unit types to handle events for; empty handles all
    pub applies_to: Vec<MessageUnitType>,
    /// When false, a successfully handled event is not passed to any further handler
    pub continue_processing: bool,
    pub settings: HashMap<String, String>,
}

impl Default for EventHandlerConfig {
    fn default() -> Self {
        Self {
            factory: String::new(),
            handled_events: Vec::new(),
            applies_to: Vec::new(),
            continue_processing: true,
            settings: HashMap::new(),
        }
    }
}

impl EventHandlerConfig {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            ..Default::default()
        }
    }

    pub fn handling(mut self, events: &[&str]) -> Self {
        self.handled_events = events.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn applies_to(mut self, types: &[MessageUnitType]) -> Self {
        self.applies_to = types.to_vec();
        self
    }

    pub fn stop_processing(mut self) -> Self {
        self.continue_processing = false;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Whether the handler's filters match the event
    pub fn should_handle(&self, event: &ProcessingEvent) -> bool {
        let event_matches =
            self.handled_events.is_empty() || self.handled_events.iter().any(|e| e == event.name());
        let type_matches = self.applies_to.is_empty()
            || event
                .subject_type()
                .is_some_and(|t| self.applies_to.contains(&t));
        event_matches && type_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::models::{Direction, MessageUnit, MessageUnitEntity, Receipt, UserMessage};
    use crate::state_machine::ProcessingState;

    fn event_for(unit: MessageUnit) -> ProcessingEvent {
        let entity = MessageUnitEntity::new(unit, ProcessingState::Received);
        ProcessingEvent::new(EventKind::MessageTransferred, &entity)
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let config = EventHandlerConfig::new("log");
        let event = event_for(MessageUnit::user_message(
            Direction::Out,
            "m@example.com",
            UserMessage::default(),
        ));
        assert!(config.should_handle(&event));
        assert!(config.continue_processing);
    }

    #[test]
    fn test_filters_on_event_name_and_unit_type() {
        let config = EventHandlerConfig::new("log")
            .handling(&["MessageTransferred"])
            .applies_to(&[MessageUnitType::Receipt]);

        let receipt_event = event_for(MessageUnit::receipt(
            Direction::Out,
            "r@example.com",
            "m@example.com",
            Receipt::default(),
        ));
        let user_message_event = event_for(MessageUnit::user_message(
            Direction::Out,
            "m@example.com",
            UserMessage::default(),
        ));

        assert!(config.should_handle(&receipt_event));
        assert!(!config.should_handle(&user_message_event));

        let other = config.clone().handling(&["DuplicateReceived"]);
        assert!(!other.should_handle(&receipt_event));
    }

    #[test]
    fn test_registry_has_builtin_log_factory() {
        let registry = EventHandlerFactoryRegistry::new();
        assert!(registry.contains("log"));
        assert!(registry.create_factory("log").is_some());
        assert!(registry.create_factory("unknown").is_none());
        assert!(EventHandlerFactoryRegistry::empty().identifiers().is_empty());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EventHandlerConfig = serde_json::from_value(serde_json::json!({
            "factory": "log",
            "applies_to": ["UserMessage"]
        }))
        .unwrap();
        assert!(config.continue_processing);
        assert_eq!(config.applies_to, vec![MessageUnitType::UserMessage]);
    }
}
