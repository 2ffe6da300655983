//! Shared fixtures for the integration tests: recording collaborators, counting event handlers
//! and a fully wired engine on top of the in-memory storage provider, with storage failures
//! that can be switched on per message unit.
#![allow(dead_code)]

use async_trait::async_trait;
use ebms_core::collaborators::{
    MessageDeliverer, MessageDeliveryError, PhysicalMessage, SecurityError, SecurityProvider,
    SecurityResult, Transport, TransportOutcome,
};
use ebms_core::config::EngineConfig;
use ebms_core::core::Core;
use ebms_core::events::{
    EventHandler, EventHandlerFactory, EventHandlerFactoryRegistry, ProcessingEvent,
};
use ebms_core::models::{
    CollaborationInfo, Containment, Direction, MessageUnit, MessageUnitEntity, PartyId,
    PayloadInfo, Service, TradingPartner, UserMessage,
};
use ebms_core::pipeline::MessageProcessor;
use ebms_core::pmode::{PModeSet, SecurityConfig};
use ebms_core::models::MessageUnitType;
use ebms_core::state_machine::{ProcessingState, TransitionOutcome};
use ebms_core::storage::{InMemoryStorageProvider, StorageError, StorageProvider, StorageResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const PMODE_ID: &str = "pm-push-reliable";

/// Transport that records every message and returns queued outcomes, success when none queued
#[derive(Default)]
pub struct RecordingTransport {
    outcomes: Mutex<VecDeque<TransportOutcome>>,
    sent: Mutex<Vec<PhysicalMessage>>,
}

impl RecordingTransport {
    pub fn fail_next(&self, reason: &str) {
        self.outcomes
            .lock()
            .push_back(TransportOutcome::failure(reason));
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_message_ids(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .flat_map(|m| m.units.iter().map(|u| u.message_id().to_string()))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &PhysicalMessage) -> TransportOutcome {
        self.sent.lock().push(message.clone());
        self.outcomes.lock().pop_front().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct RecordingDeliverer {
    failure: Mutex<Option<String>>,
    delivered: Mutex<Vec<String>>,
}

impl RecordingDeliverer {
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Mutex::new(Some(reason.to_string())),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl MessageDeliverer for RecordingDeliverer {
    async fn deliver(&self, entity: &MessageUnitEntity) -> Result<(), MessageDeliveryError> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(MessageDeliveryError::failed(reason));
        }
        self.delivered.lock().push(entity.message_id().to_string());
        Ok(())
    }
}

/// Security provider returning fixed results
pub struct StubSecurity {
    pub inbound: Result<SecurityResult, SecurityError>,
    pub outbound: Result<(), SecurityError>,
}

impl Default for StubSecurity {
    fn default() -> Self {
        Self {
            inbound: Ok(SecurityResult::default()),
            outbound: Ok(()),
        }
    }
}

#[async_trait]
impl SecurityProvider for StubSecurity {
    async fn verify_inbound(&self, _raw_message: &[u8]) -> Result<SecurityResult, SecurityError> {
        self.inbound.clone()
    }

    async fn create_outbound_headers(
        &self,
        _units: &[MessageUnitEntity],
        _sender: Option<&SecurityConfig>,
        _receiver: Option<&SecurityConfig>,
    ) -> Result<(), SecurityError> {
        self.outbound.clone()
    }
}

/// In-memory storage that fails chosen state changes of chosen message units
#[derive(Default)]
pub struct FlakyStorage {
    inner: InMemoryStorageProvider,
    failing: Mutex<Vec<(String, ProcessingState)>>,
}

impl FlakyStorage {
    /// Fail every change of `message_id` to `state` from now on
    pub fn fail_state_change(&self, message_id: &str, state: ProcessingState) {
        self.failing.lock().push((message_id.to_string(), state));
    }

    fn fails(&self, message_id: &str, state: ProcessingState) -> bool {
        self.failing
            .lock()
            .iter()
            .any(|(id, s)| id == message_id && *s == state)
    }
}

#[async_trait]
impl StorageProvider for FlakyStorage {
    async fn store(&self, entity: &MessageUnitEntity) -> StorageResult<()> {
        self.inner.store(entity).await
    }

    async fn set_state(
        &self,
        internal_id: Uuid,
        expected: Option<ProcessingState>,
        new_state: ProcessingState,
        description: Option<String>,
    ) -> StorageResult<TransitionOutcome> {
        if let Some(entity) = self.inner.get(internal_id).await? {
            if self.fails(entity.message_id(), new_state) {
                return Err(StorageError::database("set_state", "connection reset"));
            }
        }
        self.inner
            .set_state(internal_id, expected, new_state, description)
            .await
    }

    async fn set_multi_hop(&self, internal_id: Uuid, uses_multi_hop: bool) -> StorageResult<()> {
        self.inner.set_multi_hop(internal_id, uses_multi_hop).await
    }

    async fn get(&self, internal_id: Uuid) -> StorageResult<Option<MessageUnitEntity>> {
        self.inner.get(internal_id).await
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
        direction: Option<Direction>,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        self.inner.find_by_message_id(message_id, direction).await
    }

    async fn find_by_pmode(&self, pmode_id: &str) -> StorageResult<Vec<MessageUnitEntity>> {
        self.inner.find_by_pmode(pmode_id).await
    }

    async fn find_in_state(
        &self,
        unit_type: MessageUnitType,
        state: ProcessingState,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        self.inner.find_in_state(unit_type, state).await
    }

    async fn find_changed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        self.inner.find_changed_before(cutoff).await
    }

    async fn remove(&self, internal_id: Uuid) -> StorageResult<bool> {
        self.inner.remove(internal_id).await
    }
}

/// Records the names of the events it handled, per handler label
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<(String, String, String)>>,
}

impl EventLog {
    pub fn record(&self, label: &str, event: &ProcessingEvent) {
        let message_id = event
            .subject()
            .map(|s| s.message_id().to_string())
            .unwrap_or_default();
        self.entries
            .lock()
            .push((label.to_string(), event.name().to_string(), message_id));
    }

    /// Number of times the named event was handled by any handler
    pub fn count(&self, event: &str) -> usize {
        self.entries.lock().iter().filter(|(_, e, _)| e == event).count()
    }

    /// Number of events handled by the handler with the given label
    pub fn count_for(&self, label: &str) -> usize {
        self.entries.lock().iter().filter(|(l, _, _)| l == label).count()
    }

    pub fn events_for_message(&self, message_id: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, _, m)| m == message_id)
            .map(|(_, e, _)| e.clone())
            .collect()
    }
}

/// Factory whose handlers record into an [`EventLog`] under the `label` setting
pub struct RecordingHandlerFactory {
    log: Arc<EventLog>,
    label: String,
}

struct RecordingHandler {
    log: Arc<EventLog>,
    label: String,
}

impl EventHandlerFactory for RecordingHandlerFactory {
    fn init(&mut self, settings: &HashMap<String, String>) -> anyhow::Result<()> {
        self.label = settings
            .get("label")
            .cloned()
            .unwrap_or_else(|| "recording".to_string());
        Ok(())
    }

    fn create_handler(&self) -> anyhow::Result<Box<dyn EventHandler>> {
        Ok(Box::new(RecordingHandler {
            log: Arc::clone(&self.log),
            label: self.label.clone(),
        }))
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_event(&self, event: &ProcessingEvent) -> anyhow::Result<()> {
        self.log.record(&self.label, event);
        Ok(())
    }
}

/// Factory whose handlers always fail
#[derive(Default)]
pub struct FailingHandlerFactory;

struct FailingHandler;

impl EventHandlerFactory for FailingHandlerFactory {
    fn init(&mut self, _settings: &HashMap<String, String>) -> anyhow::Result<()> {
        Ok(())
    }

    fn create_handler(&self) -> anyhow::Result<Box<dyn EventHandler>> {
        Ok(Box::new(FailingHandler))
    }
}

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle_event(&self, _event: &ProcessingEvent) -> anyhow::Result<()> {
        anyhow::bail!("handler is broken")
    }
}

/// Factory registry with the `recording` and `failing` factories added
pub fn handler_factories(log: &Arc<EventLog>) -> Arc<EventHandlerFactoryRegistry> {
    let registry = EventHandlerFactoryRegistry::new();
    let shared = Arc::clone(log);
    registry.register("recording", move || RecordingHandlerFactory {
        log: Arc::clone(&shared),
        label: String::new(),
    });
    registry.register("failing", FailingHandlerFactory::default);
    Arc::new(registry)
}

/// A wired engine on in-memory storage
pub struct TestEngine {
    pub core: Core,
    pub storage: Arc<FlakyStorage>,
    pub processor: Arc<MessageProcessor>,
    pub transport: Arc<RecordingTransport>,
    pub deliverer: Arc<RecordingDeliverer>,
    pub pmodes: Arc<PModeSet>,
    pub events: Arc<EventLog>,
}

pub struct TestEngineBuilder {
    config: EngineConfig,
    pmodes: Vec<ebms_core::pmode::ProcessingMode>,
    deliverer: RecordingDeliverer,
    security: Option<StubSecurity>,
}

impl TestEngine {
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder {
            config: EngineConfig::default(),
            pmodes: Vec::new(),
            deliverer: RecordingDeliverer::default(),
            security: None,
        }
    }

    pub fn registry(&self) -> &ebms_core::storage::MessageUnitRegistry {
        self.core.registry()
    }

    /// The stored instance of the message unit with the given id and direction
    pub async fn stored(&self, message_id: &str, direction: Direction) -> Vec<MessageUnitEntity> {
        self.core
            .registry()
            .find_by_message_id(message_id, Some(direction))
            .await
            .expect("query succeeds")
    }
}

impl TestEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pmode(mut self, pmode: ebms_core::pmode::ProcessingMode) -> Self {
        self.pmodes.push(pmode);
        self
    }

    pub fn deliverer(mut self, deliverer: RecordingDeliverer) -> Self {
        self.deliverer = deliverer;
        self
    }

    pub fn security(mut self, security: StubSecurity) -> Self {
        self.security = Some(security);
        self
    }

    pub fn build(mut self) -> TestEngine {
        let events = Arc::new(EventLog::default());
        let pmodes = Arc::new(PModeSet::with_pmodes(self.pmodes));
        self.config.event_handlers.push(
            ebms_core::events::EventHandlerConfig::new("recording").with_setting("label", "global"),
        );
        let storage = Arc::new(FlakyStorage::default());
        let core = Core::new(
            self.config,
            storage.clone(),
            pmodes.clone(),
            handler_factories(&events),
        );
        let transport = Arc::new(RecordingTransport::default());
        let deliverer = Arc::new(self.deliverer);

        let mut builder = MessageProcessor::builder(core.clone())
            .transport(transport.clone())
            .deliverer(deliverer.clone());
        if let Some(security) = self.security {
            builder = builder.security(Arc::new(security));
        }
        let processor = Arc::new(builder.build().expect("processor builds"));

        TestEngine {
            core,
            storage,
            processor,
            transport,
            deliverer,
            pmodes,
            events,
        }
    }
}

/// A User Message that passes lax header validation
pub fn valid_user_message(direction: Direction, message_id: &str) -> MessageUnit {
    let partner = |id: &str, role: &str| TradingPartner {
        party_ids: vec![PartyId::new(format!("urn:party:{id}"))],
        role: role.to_string(),
    };
    MessageUnit::user_message(
        direction,
        message_id,
        UserMessage {
            mpc: None,
            sender: partner("sender", "urn:role:seller"),
            receiver: partner("receiver", "urn:role:buyer"),
            collaboration: CollaborationInfo {
                service: Service {
                    name: "urn:service:orders".into(),
                    service_type: None,
                },
                action: "SubmitOrder".into(),
                conversation_id: Some("conv-1".into()),
                agreement_ref: None,
            },
            payloads: vec![PayloadInfo {
                content_id: "cid:order@example.com".into(),
                containment: Containment::Attachment,
                content_location: Some("/data/order.xml".into()),
                mime_type: Some("application/xml".into()),
            }],
        },
    )
    .with_pmode(PMODE_ID)
}
