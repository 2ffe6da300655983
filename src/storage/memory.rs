//! In-memory storage provider.
//!
//! Each message unit sits behind its own mutex, so state changes of different units never
//! contend. The map shard guard is always released before a unit's mutex is taken.

use super::{StorageError, StorageProvider, StorageResult};
use crate::models::{Direction, MessageUnitEntity, MessageUnitType};
use crate::state_machine::{ProcessingState, TransitionOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryStorageProvider {
    units: DashMap<Uuid, Arc<Mutex<MessageUnitEntity>>>,
}

impl InMemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn slot(&self, internal_id: Uuid) -> Option<Arc<Mutex<MessageUnitEntity>>> {
        self.units.get(&internal_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all units matching the predicate, oldest first
    fn select<F>(&self, predicate: F) -> Vec<MessageUnitEntity>
    where
        F: Fn(&MessageUnitEntity) -> bool,
    {
        let slots: Vec<_> = self.units.iter().map(|e| Arc::clone(e.value())).collect();
        let mut found: Vec<MessageUnitEntity> = slots
            .into_iter()
            .filter_map(|slot| {
                let entity = slot.lock();
                predicate(&entity).then(|| entity.clone())
            })
            .collect();
        found.sort_by(|a, b| {
            a.processing_states()[0]
                .start_time
                .cmp(&b.processing_states()[0].start_time)
                .then_with(|| a.internal_id().cmp(&b.internal_id()))
        });
        found
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn store(&self, entity: &MessageUnitEntity) -> StorageResult<()> {
        match self.units.entry(entity.internal_id()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                internal_id: entity.internal_id(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(entity.clone())));
                Ok(())
            }
        }
    }

    async fn set_state(
        &self,
        internal_id: Uuid,
        expected: Option<ProcessingState>,
        new_state: ProcessingState,
        description: Option<String>,
    ) -> StorageResult<TransitionOutcome> {
        let slot = self
            .slot(internal_id)
            .ok_or_else(|| StorageError::not_found(internal_id))?;
        let mut entity = slot.lock();
        Ok(entity
            .processing_states
            .try_append(expected, new_state, description))
    }

    async fn set_multi_hop(&self, internal_id: Uuid, uses_multi_hop: bool) -> StorageResult<()> {
        let slot = self
            .slot(internal_id)
            .ok_or_else(|| StorageError::not_found(internal_id))?;
        slot.lock().uses_multi_hop = uses_multi_hop;
        Ok(())
    }

    async fn get(&self, internal_id: Uuid) -> StorageResult<Option<MessageUnitEntity>> {
        Ok(self.slot(internal_id).map(|slot| slot.lock().clone()))
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
        direction: Option<Direction>,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        Ok(self.select(|e| {
            e.message_id() == message_id && direction.map_or(true, |d| e.direction() == d)
        }))
    }

    async fn find_by_pmode(&self, pmode_id: &str) -> StorageResult<Vec<MessageUnitEntity>> {
        Ok(self.select(|e| e.pmode_id() == Some(pmode_id)))
    }

    async fn find_in_state(
        &self,
        unit_type: MessageUnitType,
        state: ProcessingState,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        Ok(self.select(|e| e.unit_type() == unit_type && e.current_state() == state))
    }

    async fn find_changed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        Ok(self.select(|e| e.current_record().start_time < cutoff))
    }

    async fn remove(&self, internal_id: Uuid) -> StorageResult<bool> {
        Ok(self.units.remove(&internal_id).is_some())
    }
}
