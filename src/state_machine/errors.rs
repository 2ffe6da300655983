use thiserror::Error;

/// Errors raised when a processing state history cannot be interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Processing state history is empty")]
    EmptyHistory,

    #[error("Processing state history out of order: sequence {found} follows {previous}")]
    OutOfOrder { previous: u32, found: u32 },

    #[error("Unknown processing state: {value}")]
    UnknownState { value: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
