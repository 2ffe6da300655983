//! # Message Unit Storage
//!
//! The storage provider abstraction and its implementations, plus the
//! [`MessageUnitRegistry`] through which the rest of the engine creates message units and
//! changes their processing state.
//!
//! Providers must implement the conditional state change atomically: the expected current state
//! is compared and the new record appended as one operation, so concurrent actors never both
//! succeed with the same expected state.

pub mod errors;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod registry;

use crate::models::{Direction, MessageUnitEntity, MessageUnitType};
use crate::state_machine::{ProcessingState, TransitionOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use errors::{RegistryError, RegistryResult, StorageError, StorageResult};
pub use memory::InMemoryStorageProvider;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorageProvider;
pub use registry::MessageUnitRegistry;

/// Persistence of message units and their processing state history
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Persist a new message unit including its initial state history
    async fn store(&self, entity: &MessageUnitEntity) -> StorageResult<()>;

    /// Append a processing state. When `expected` is given the append only happens if it equals
    /// the persisted current state.
    async fn set_state(
        &self,
        internal_id: Uuid,
        expected: Option<ProcessingState>,
        new_state: ProcessingState,
        description: Option<String>,
    ) -> StorageResult<TransitionOutcome>;

    async fn set_multi_hop(&self, internal_id: Uuid, uses_multi_hop: bool) -> StorageResult<()>;

    async fn get(&self, internal_id: Uuid) -> StorageResult<Option<MessageUnitEntity>>;

    /// All stored instances with the given message id, optionally limited to one direction
    async fn find_by_message_id(
        &self,
        message_id: &str,
        direction: Option<Direction>,
    ) -> StorageResult<Vec<MessageUnitEntity>>;

    async fn find_by_pmode(&self, pmode_id: &str) -> StorageResult<Vec<MessageUnitEntity>>;

    /// Message units of the given type whose current state is `state`
    async fn find_in_state(
        &self,
        unit_type: MessageUnitType,
        state: ProcessingState,
    ) -> StorageResult<Vec<MessageUnitEntity>>;

    /// Message units whose current state started before the cutoff
    async fn find_changed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageUnitEntity>>;

    /// Remove a message unit and its history. Returns whether it existed.
    async fn remove(&self, internal_id: Uuid) -> StorageResult<bool>;
}
