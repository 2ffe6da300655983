//! # Message Unit Registry
//!
//! Entry point for creating message units and changing their processing state. Every change
//! goes to the storage provider first; the caller's entity handle is only updated once the
//! provider confirmed it, so a handle never shows a state that was not persisted.
//!
//! ```rust
//! use ebms_core::models::{Direction, MessageUnit, UserMessage};
//! use ebms_core::state_machine::ProcessingState;
//! use ebms_core::storage::{InMemoryStorageProvider, MessageUnitRegistry};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = MessageUnitRegistry::new(Arc::new(InMemoryStorageProvider::new()));
//! let unit = MessageUnit::user_message(Direction::Out, "m1@example.com", UserMessage::default());
//! let mut entity = registry.store_outgoing(unit).await.unwrap();
//!
//! let first = registry
//!     .set_state_if(&mut entity, ProcessingState::Submitted, ProcessingState::ReadyToPush, None)
//!     .await
//!     .unwrap();
//! let second = registry
//!     .set_state_if(&mut entity, ProcessingState::Submitted, ProcessingState::Failure, None)
//!     .await
//!     .unwrap();
//! assert!(first.is_applied());
//! assert!(!second.is_applied());
//! assert_eq!(entity.current_state(), ProcessingState::ReadyToPush);
//! # });
//! ```

use super::{RegistryError, RegistryResult, StorageError, StorageProvider};
use crate::logging::log_state_transition;
use crate::models::{Direction, MessageUnit, MessageUnitEntity, MessageUnitType};
use crate::state_machine::{ProcessingState, ProcessingStateRecord, TransitionOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageUnitRegistry {
    provider: Arc<dyn StorageProvider>,
}

impl std::fmt::Debug for MessageUnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageUnitRegistry").finish_non_exhaustive()
    }
}

impl MessageUnitRegistry {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// Store a message unit read from a received message. Its initial state is RECEIVED.
    pub async fn store_received(&self, unit: MessageUnit) -> RegistryResult<MessageUnitEntity> {
        check_direction(&unit, Direction::In)?;
        self.store(unit, ProcessingState::Received).await
    }

    /// Store a message unit to be sent. User Messages start as SUBMITTED, signals as CREATED.
    pub async fn store_outgoing(&self, unit: MessageUnit) -> RegistryResult<MessageUnitEntity> {
        check_direction(&unit, Direction::Out)?;
        let initial = match unit.unit_type() {
            MessageUnitType::UserMessage => ProcessingState::Submitted,
            _ => ProcessingState::Created,
        };
        self.store(unit, initial).await
    }

    async fn store(
        &self,
        unit: MessageUnit,
        initial: ProcessingState,
    ) -> RegistryResult<MessageUnitEntity> {
        let entity = MessageUnitEntity::new(unit, initial);
        self.provider.store(&entity).await?;
        debug!(
            internal_id = %entity.internal_id(),
            message_id = %entity.message_id(),
            unit_type = %entity.unit_type(),
            direction = %entity.direction(),
            state = %initial,
            "Stored message unit"
        );
        Ok(entity)
    }

    /// Change the processing state only if the current state is `expected`.
    ///
    /// A mismatch is not an error: it is reported as [`TransitionOutcome::AlreadyChanged`] and
    /// the handle is refreshed to the persisted state.
    pub async fn set_state_if(
        &self,
        entity: &mut MessageUnitEntity,
        expected: ProcessingState,
        new_state: ProcessingState,
        description: Option<&str>,
    ) -> RegistryResult<TransitionOutcome> {
        self.apply(entity, Some(expected), new_state, description)
            .await
    }

    /// Change the processing state unconditionally
    pub async fn set_state(
        &self,
        entity: &mut MessageUnitEntity,
        new_state: ProcessingState,
        description: Option<&str>,
    ) -> RegistryResult<ProcessingStateRecord> {
        match self.apply(entity, None, new_state, description).await? {
            TransitionOutcome::Applied(record) => Ok(record),
            // Providers only reject when an expected state is given
            TransitionOutcome::AlreadyChanged { current } => Err(StorageError::corrupt_state(
                entity.internal_id(),
                format!("unconditional change to {new_state} rejected in state {current}"),
            )
            .into()),
        }
    }

    async fn apply(
        &self,
        entity: &mut MessageUnitEntity,
        expected: Option<ProcessingState>,
        new_state: ProcessingState,
        description: Option<&str>,
    ) -> RegistryResult<TransitionOutcome> {
        let outcome = self
            .provider
            .set_state(
                entity.internal_id(),
                expected,
                new_state,
                description.map(str::to_string),
            )
            .await?;

        log_state_transition(entity, expected, new_state, &outcome);

        let up_to_date = match &outcome {
            TransitionOutcome::Applied(record) => entity.processing_states.merge(record.clone()),
            TransitionOutcome::AlreadyChanged { .. } => false,
        };
        if !up_to_date {
            self.reload(entity).await?;
        }
        Ok(outcome)
    }

    /// Replace the handle's content with the persisted message unit
    pub async fn reload(&self, entity: &mut MessageUnitEntity) -> RegistryResult<()> {
        let fresh = self
            .provider
            .get(entity.internal_id())
            .await?
            .ok_or_else(|| StorageError::not_found(entity.internal_id()))?;
        *entity = fresh;
        Ok(())
    }

    /// Mark the unit as received through an intermediary. The flag is only ever set once.
    pub async fn set_multi_hop(
        &self,
        entity: &mut MessageUnitEntity,
        uses_multi_hop: bool,
    ) -> RegistryResult<()> {
        if entity.uses_multi_hop() == uses_multi_hop {
            return Ok(());
        }
        if entity.uses_multi_hop() {
            warn!(
                internal_id = %entity.internal_id(),
                message_id = %entity.message_id(),
                "Multi-hop flag is already set and cannot be cleared"
            );
            return Ok(());
        }
        self.provider
            .set_multi_hop(entity.internal_id(), uses_multi_hop)
            .await?;
        entity.uses_multi_hop = uses_multi_hop;
        Ok(())
    }

    pub async fn get(&self, internal_id: Uuid) -> RegistryResult<Option<MessageUnitEntity>> {
        Ok(self.provider.get(internal_id).await?)
    }

    pub async fn find_by_message_id(
        &self,
        message_id: &str,
        direction: Option<Direction>,
    ) -> RegistryResult<Vec<MessageUnitEntity>> {
        Ok(self
            .provider
            .find_by_message_id(message_id, direction)
            .await?)
    }

    pub async fn find_by_pmode(&self, pmode_id: &str) -> RegistryResult<Vec<MessageUnitEntity>> {
        Ok(self.provider.find_by_pmode(pmode_id).await?)
    }

    pub async fn find_in_state(
        &self,
        unit_type: MessageUnitType,
        state: ProcessingState,
    ) -> RegistryResult<Vec<MessageUnitEntity>> {
        Ok(self.provider.find_in_state(unit_type, state).await?)
    }

    pub async fn find_changed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RegistryResult<Vec<MessageUnitEntity>> {
        Ok(self.provider.find_changed_before(cutoff).await?)
    }

    /// Physically remove a message unit. Callers raise the purge event before calling this.
    pub async fn remove(&self, entity: &MessageUnitEntity) -> RegistryResult<bool> {
        Ok(self.provider.remove(entity.internal_id()).await?)
    }
}

fn check_direction(unit: &MessageUnit, expected: Direction) -> RegistryResult<()> {
    if unit.direction != expected {
        return Err(RegistryError::DirectionMismatch {
            message_id: unit.message_id.clone(),
            expected,
            actual: unit.direction,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Receipt, UserMessage};
    use crate::storage::InMemoryStorageProvider;

    fn registry() -> MessageUnitRegistry {
        MessageUnitRegistry::new(Arc::new(InMemoryStorageProvider::new()))
    }

    #[tokio::test]
    async fn test_initial_states() {
        let registry = registry();
        let um = registry
            .store_outgoing(MessageUnit::user_message(
                Direction::Out,
                "um@example.com",
                UserMessage::default(),
            ))
            .await
            .unwrap();
        assert_eq!(um.current_state(), ProcessingState::Submitted);

        let receipt = registry
            .store_outgoing(MessageUnit::receipt(
                Direction::Out,
                "rcpt@example.com",
                "um@example.com",
                Receipt::default(),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.current_state(), ProcessingState::Created);

        let received = registry
            .store_received(MessageUnit::user_message(
                Direction::In,
                "in@example.com",
                UserMessage::default(),
            ))
            .await
            .unwrap();
        assert_eq!(received.current_state(), ProcessingState::Received);
    }

    #[tokio::test]
    async fn test_direction_is_checked() {
        let result = registry()
            .store_received(MessageUnit::user_message(
                Direction::Out,
                "um@example.com",
                UserMessage::default(),
            ))
            .await;
        assert!(matches!(result, Err(RegistryError::DirectionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_stale_handle_is_refreshed_on_lost_race() {
        let registry = registry();
        let mut first = registry
            .store_received(MessageUnit::user_message(
                Direction::In,
                "race@example.com",
                UserMessage::default(),
            ))
            .await
            .unwrap();
        let mut second = first.clone();

        let won = registry
            .set_state_if(&mut first, ProcessingState::Received, ProcessingState::Processing, None)
            .await
            .unwrap();
        assert!(won.is_applied());

        let lost = registry
            .set_state_if(&mut second, ProcessingState::Received, ProcessingState::Processing, None)
            .await
            .unwrap();
        assert!(!lost.is_applied());
        assert_eq!(second.current_state(), ProcessingState::Processing);
        assert_eq!(second.processing_states().len(), 2);
    }

    #[tokio::test]
    async fn test_multi_hop_is_set_once() {
        let registry = registry();
        let mut entity = registry
            .store_received(MessageUnit::pull_request(Direction::In, "pr@example.com", "urn:mpc"))
            .await
            .unwrap();

        registry.set_multi_hop(&mut entity, true).await.unwrap();
        registry.set_multi_hop(&mut entity, false).await.unwrap();

        let stored = registry.get(entity.internal_id()).await.unwrap().unwrap();
        assert!(stored.uses_multi_hop());
        assert!(entity.uses_multi_hop());
    }
}
