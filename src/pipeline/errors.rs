use crate::config::ConfigurationError;
use crate::storage::RegistryError;
use thiserror::Error;

/// Errors that stop the processing of a message
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Stage {stage} failed: {reason}")]
    Stage { stage: String, reason: String },

    #[error("P-Mode not found: {pmode_id}")]
    UnknownPMode { pmode_id: String },

    #[error("Invalid submission: {reason}")]
    InvalidSubmission { reason: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl PipelineError {
    pub fn stage(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_submission(reason: impl Into<String>) -> Self {
        Self::InvalidSubmission {
            reason: reason.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
