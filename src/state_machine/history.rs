//! # Processing State History
//!
//! The append-only log of processing states every message unit carries. The current state is
//! always the last record; records are never reordered, changed or removed.
//!
//! Appending supports an optional expected current state. When given and it does not match the
//! actual current state the append is rejected with [`TransitionOutcome::AlreadyChanged`]. This
//! compare-and-append is what keeps concurrent actors (two deliveries of the same message, a
//! resend racing an incoming Receipt) from both acting on the same message unit.

use super::errors::{StateMachineError, StateMachineResult};
use super::states::ProcessingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the processing state history of a message unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStateRecord {
    /// Position in the history, starting at 1 and strictly increasing
    pub sequence: u32,
    pub state: ProcessingState,
    /// When the message unit entered this state
    pub start_time: DateTime<Utc>,
    pub description: Option<String>,
}

/// Result of an attempt to append a processing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The new state was appended
    Applied(ProcessingStateRecord),
    /// The current state did not match the expected one; another actor already changed it
    AlreadyChanged { current: ProcessingState },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn record(&self) -> Option<&ProcessingStateRecord> {
        match self {
            Self::Applied(record) => Some(record),
            Self::AlreadyChanged { .. } => None,
        }
    }
}

/// Ordered, append-only processing state history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<ProcessingStateRecord>",
    into = "Vec<ProcessingStateRecord>"
)]
pub struct ProcessingStateLog {
    records: Vec<ProcessingStateRecord>,
}

impl ProcessingStateLog {
    /// Start a history with the given initial state
    pub fn new(initial: ProcessingState, description: Option<String>) -> Self {
        Self {
            records: vec![ProcessingStateRecord {
                sequence: 1,
                state: initial,
                start_time: Utc::now(),
                description,
            }],
        }
    }

    /// Rebuild a history from persisted records, checking their ordering
    pub fn from_records(records: Vec<ProcessingStateRecord>) -> StateMachineResult<Self> {
        if records.is_empty() {
            return Err(StateMachineError::EmptyHistory);
        }
        for pair in records.windows(2) {
            if pair[1].sequence <= pair[0].sequence {
                return Err(StateMachineError::OutOfOrder {
                    previous: pair[0].sequence,
                    found: pair[1].sequence,
                });
            }
        }
        Ok(Self { records })
    }

    pub fn current(&self) -> &ProcessingStateRecord {
        // Constructors guarantee at least one record
        &self.records[self.records.len() - 1]
    }

    pub fn current_state(&self) -> ProcessingState {
        self.current().state
    }

    pub fn records(&self) -> &[ProcessingStateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of times the message unit entered the given state
    pub fn count_of(&self, state: ProcessingState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    /// Compare-and-append: append `state` only if the current state equals `expected`.
    ///
    /// Passing `None` as `expected` appends unconditionally.
    pub fn try_append(
        &mut self,
        expected: Option<ProcessingState>,
        state: ProcessingState,
        description: Option<String>,
    ) -> TransitionOutcome {
        let current = self.current();
        if let Some(expected) = expected {
            if current.state != expected {
                return TransitionOutcome::AlreadyChanged {
                    current: current.state,
                };
            }
        }

        // Start times never go backwards, even if the wall clock does
        let start_time = Utc::now().max(current.start_time);
        let record = ProcessingStateRecord {
            sequence: current.sequence + 1,
            state,
            start_time,
            description,
        };
        self.records.push(record.clone());
        TransitionOutcome::Applied(record)
    }

    /// Merge a record appended by the storage layer into this copy of the history.
    ///
    /// Returns `false` when the record does not directly follow the last known one, meaning
    /// this copy is stale and must be reloaded.
    pub(crate) fn merge(&mut self, record: ProcessingStateRecord) -> bool {
        if record.sequence == self.current().sequence + 1 {
            self.records.push(record);
            true
        } else {
            false
        }
    }
}

impl TryFrom<Vec<ProcessingStateRecord>> for ProcessingStateLog {
    type Error = StateMachineError;

    fn try_from(records: Vec<ProcessingStateRecord>) -> Result<Self, Self::Error> {
        Self::from_records(records)
    }
}

impl From<ProcessingStateLog> for Vec<ProcessingStateRecord> {
    fn from(log: ProcessingStateLog) -> Self {
        log.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_log_has_single_record() {
        let log = ProcessingStateLog::new(ProcessingState::Received, None);
        assert_eq!(log.len(), 1);
        assert_eq!(log.current_state(), ProcessingState::Received);
        assert_eq!(log.current().sequence, 1);
    }

    #[test]
    fn test_conditional_append_rejects_mismatch() {
        let mut log = ProcessingStateLog::new(ProcessingState::ReadyForDelivery, None);

        let first = log.try_append(
            Some(ProcessingState::ReadyForDelivery),
            ProcessingState::OutForDelivery,
            None,
        );
        assert!(first.is_applied());

        let second = log.try_append(
            Some(ProcessingState::ReadyForDelivery),
            ProcessingState::OutForDelivery,
            None,
        );
        assert_eq!(
            second,
            TransitionOutcome::AlreadyChanged {
                current: ProcessingState::OutForDelivery
            }
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_unconditional_append_keeps_order() {
        let mut log = ProcessingStateLog::new(ProcessingState::Submitted, None);
        log.try_append(None, ProcessingState::ReadyToPush, None);
        log.try_append(None, ProcessingState::Sending, None);
        log.try_append(None, ProcessingState::AwaitingReceipt, Some("receipt expected".into()));

        let states: Vec<_> = log.records().iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                ProcessingState::Submitted,
                ProcessingState::ReadyToPush,
                ProcessingState::Sending,
                ProcessingState::AwaitingReceipt
            ]
        );
        assert_eq!(log.count_of(ProcessingState::Sending), 1);
        assert_eq!(log.current().description.as_deref(), Some("receipt expected"));
    }

    #[test]
    fn test_from_records_rejects_out_of_order() {
        let now = Utc::now();
        let records = vec![
            ProcessingStateRecord {
                sequence: 2,
                state: ProcessingState::Received,
                start_time: now,
                description: None,
            },
            ProcessingStateRecord {
                sequence: 1,
                state: ProcessingState::Processing,
                start_time: now,
                description: None,
            },
        ];
        assert_eq!(
            ProcessingStateLog::from_records(records),
            Err(StateMachineError::OutOfOrder {
                previous: 2,
                found: 1
            })
        );
        assert_eq!(
            ProcessingStateLog::from_records(vec![]),
            Err(StateMachineError::EmptyHistory)
        );
    }

    #[test]
    fn test_merge_detects_stale_copy() {
        let mut original = ProcessingStateLog::new(ProcessingState::Received, None);
        let mut copy = original.clone();

        original.try_append(None, ProcessingState::Processing, None);
        let outcome = original.try_append(None, ProcessingState::ReadyForDelivery, None);

        assert!(!copy.merge(outcome.record().unwrap().clone()));
        assert_eq!(copy.len(), 1);
    }
}
