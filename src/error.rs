//! Crate level error type collecting the errors of the individual components.

use crate::collaborators::{MessageDeliveryError, SecurityError};
use crate::config::ConfigurationError;
use crate::pipeline::PipelineError;
use crate::state_machine::StateMachineError;
use crate::storage::{RegistryError, StorageError};
use crate::validation::ValidatorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EbmsCoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Delivery(#[from] MessageDeliveryError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type Result<T> = std::result::Result<T, EbmsCoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_errors_convert() {
        fn load() -> Result<()> {
            Err(ConfigurationError::unknown_validator_set("custom"))?
        }
        let err = load().unwrap_err();
        assert!(matches!(err, EbmsCoreError::Configuration(_)));
        assert_eq!(err.to_string(), "Unknown header validator set 'custom'");
    }
}
