//! # Header Validation
//!
//! Validation of the ebMS header meta-data of received message units. Validators are grouped
//! in a [`ValidatorSet`] per message unit type and validation mode; strict mode runs the lax
//! validators plus the strict-only ones. Validators report their findings as values, a
//! [`ValidatorError`] only means the validator itself could not do its work.

pub mod set;
pub mod stage;
pub mod validators;

use crate::models::{MessageUnit, Severity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use set::{ValidatorSet, ValidatorSetRegistry};
pub use stage::HeaderValidationStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    Lax,
    Strict,
}

/// A problem found in the header of a message unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub description: String,
    pub severity: Severity,
    /// The problem must be reported with its own ValueInconsistent error instead of being
    /// included in the InvalidHeader error
    pub value_inconsistent: bool,
}

impl ValidationFailure {
    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            severity: Severity::Failure,
            value_inconsistent: false,
        }
    }

    pub fn warning(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            severity: Severity::Warning,
            value_inconsistent: false,
        }
    }

    pub fn inconsistent(mut self) -> Self {
        self.value_inconsistent = true;
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("Validator {validator} could not validate the message unit: {reason}")]
    Internal { validator: String, reason: String },
}

impl ValidatorError {
    pub fn internal(validator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Internal {
            validator: validator.into(),
            reason: reason.into(),
        }
    }
}

/// Checks one aspect of a message unit header
pub trait HeaderValidator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError>;
}
