use super::message_unit::{Direction, LegLabel, MessageUnit, MessageUnitType};
use crate::state_machine::{ProcessingState, ProcessingStateLog, ProcessingStateRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored message unit as managed by the registry.
///
/// The `internal_id` identifies this stored instance. It is not the ebMS message id: a
/// retransmitted User Message is stored again under a new internal id with the same message id.
/// State changes only happen through the registry, which refreshes this handle after the storage
/// provider confirmed the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUnitEntity {
    pub(crate) internal_id: Uuid,
    pub(crate) unit: MessageUnit,
    pub(crate) uses_multi_hop: bool,
    pub(crate) processing_states: ProcessingStateLog,
}

impl MessageUnitEntity {
    pub(crate) fn new(unit: MessageUnit, initial: ProcessingState) -> Self {
        Self {
            internal_id: Uuid::new_v4(),
            unit,
            uses_multi_hop: false,
            processing_states: ProcessingStateLog::new(initial, None),
        }
    }

    pub(crate) fn from_parts(
        internal_id: Uuid,
        unit: MessageUnit,
        uses_multi_hop: bool,
        processing_states: ProcessingStateLog,
    ) -> Self {
        Self {
            internal_id,
            unit,
            uses_multi_hop,
            processing_states,
        }
    }

    pub fn internal_id(&self) -> Uuid {
        self.internal_id
    }

    pub fn unit(&self) -> &MessageUnit {
        &self.unit
    }

    pub fn message_id(&self) -> &str {
        &self.unit.message_id
    }

    pub fn ref_to_message_id(&self) -> Option<&str> {
        self.unit.ref_to_message_id.as_deref()
    }

    pub fn direction(&self) -> Direction {
        self.unit.direction
    }

    pub fn unit_type(&self) -> MessageUnitType {
        self.unit.unit_type()
    }

    pub fn pmode_id(&self) -> Option<&str> {
        self.unit.pmode_id.as_deref()
    }

    pub fn leg_label(&self) -> LegLabel {
        self.unit.leg_label
    }

    pub fn uses_multi_hop(&self) -> bool {
        self.uses_multi_hop
    }

    pub fn processing_states(&self) -> &[ProcessingStateRecord] {
        self.processing_states.records()
    }

    pub fn state_log(&self) -> &ProcessingStateLog {
        &self.processing_states
    }

    pub fn current_state(&self) -> ProcessingState {
        self.processing_states.current_state()
    }

    pub fn current_record(&self) -> &ProcessingStateRecord {
        self.processing_states.current()
    }
}
