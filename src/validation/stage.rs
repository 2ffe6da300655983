//! # Header Validation Stage
//!
//! Validates the header meta-data of every received message unit that is still in state
//! RECEIVED. Strict mode applies when either the engine configuration or the unit's P-Mode
//! asks for it.
//!
//! Failures marked as value inconsistencies each become a ValueInconsistent error; all other
//! failures are combined into a single InvalidHeader error whose severity is the highest one
//! found. An invalid unit is set to FAILURE and a `HeaderValidationFailure` event is raised.

use super::{ValidationFailure, ValidationMode, ValidatorSet, ValidatorSetRegistry};
use crate::config::ConfigurationError;
use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_stage_decision;
use crate::models::{EbmsError, MessageUnitEntity, Severity};
use crate::pipeline::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

const STAGE: &str = "HeaderValidation";

pub struct HeaderValidationStage {
    core: Core,
    validators: Arc<ValidatorSet>,
}

impl std::fmt::Debug for HeaderValidationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderValidationStage")
            .field("validators", &self.validators)
            .finish()
    }
}

impl HeaderValidationStage {
    /// Build the stage with the validator set named in the engine configuration.
    ///
    /// Fails when that set is not registered; the engine cannot validate messages without it.
    pub fn new(core: Core, sets: &ValidatorSetRegistry) -> Result<Self, ConfigurationError> {
        let identifier = core.config().validator_set.clone();
        let Some(validators) = sets.get(&identifier) else {
            error!(
                validator_set = %identifier,
                "FATAL: header validator set is not available, message processing cannot start"
            );
            return Err(ConfigurationError::unknown_validator_set(identifier));
        };
        Ok(Self { core, validators })
    }

    fn mode_for(&self, entity: &MessageUnitEntity) -> ValidationMode {
        let strict = self.core.config().strict_header_validation
            || self
                .core
                .pmode_of(entity)
                .is_some_and(|pmode| pmode.strict_header_validation);
        if strict {
            ValidationMode::Strict
        } else {
            ValidationMode::Lax
        }
    }

    /// Validate one received unit. Returns the ebMS errors to report, empty when valid.
    pub async fn validate_unit(
        &self,
        entity: &mut MessageUnitEntity,
    ) -> PipelineResult<Vec<EbmsError>> {
        let mode = self.mode_for(entity);
        debug!(
            message_id = %entity.message_id(),
            unit_type = %entity.unit_type(),
            mode = ?mode,
            "Validating header meta-data"
        );

        match self.validators.validate(entity.unit(), mode) {
            Ok(failures) if failures.is_empty() => {
                debug!(message_id = %entity.message_id(), "Header successfully validated");
                Ok(Vec::new())
            }
            Ok(failures) => {
                warn!(
                    message_id = %entity.message_id(),
                    unit_type = %entity.unit_type(),
                    failures = failures.len(),
                    details = %failures.iter().map(|f| f.description.as_str()).collect::<Vec<_>>().join("; "),
                    "Header of message unit is invalid"
                );
                let errors = build_ebms_errors(entity.message_id(), &failures);
                self.core
                    .registry()
                    .set_state(entity, ProcessingState::Failure, Some("Invalid header"))
                    .await?;
                self.core
                    .raise(
                        EventKind::HeaderValidationFailure {
                            failure: failures.into_iter().next(),
                            reason: None,
                        },
                        entity,
                    )
                    .await;
                Ok(errors)
            }
            Err(validator_error) => {
                error!(
                    message_id = %entity.message_id(),
                    error = %validator_error,
                    "Error during header validation"
                );
                self.core
                    .registry()
                    .set_state(entity, ProcessingState::Failure, Some("Header validation error"))
                    .await?;
                self.core
                    .raise(
                        EventKind::HeaderValidationFailure {
                            failure: None,
                            reason: Some(validator_error.to_string()),
                        },
                        entity,
                    )
                    .await;
                Ok(vec![EbmsError::other_content_error(
                    "Internal error",
                    Some(entity.message_id()),
                )])
            }
        }
    }
}

/// Turn validation failures into the ebMS errors reporting them
pub fn build_ebms_errors(message_id: &str, failures: &[ValidationFailure]) -> Vec<EbmsError> {
    let mut errors = Vec::new();
    let mut details = String::new();
    let mut count = 0usize;
    let mut max_severity = Severity::Warning;

    for failure in failures {
        if failure.value_inconsistent {
            errors.push(EbmsError::value_inconsistent(
                failure.description.clone(),
                Some(message_id),
            ));
        } else {
            details.push_str(&failure.description);
            details.push('\n');
            max_severity = max_severity.max(failure.severity);
            count += 1;
        }
    }

    if count > 0 {
        let detail = format!(
            "The message was found to be invalid!\n{count} validation error(s) found in the message:\n{details}"
        );
        errors.push(
            EbmsError::invalid_header(detail, Some(message_id)).with_severity(max_severity),
        );
    }
    errors
}

#[async_trait]
impl PipelineStage for HeaderValidationStage {
    fn name(&self) -> &'static str {
        STAGE
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut generated = Vec::new();
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            if entity.current_state() != ProcessingState::Received {
                kept.push(entity);
                continue;
            }
            match self.validate_unit(&mut entity).await {
                Ok(errors) => {
                    if !errors.is_empty() {
                        log_stage_decision(STAGE, entity.message_id(), "rejected", None);
                    }
                    generated.extend(errors);
                    kept.push(entity);
                }
                Err(e) => log_unit_failure(STAGE, &entity, &e),
            }
        }
        ctx.received_units = kept;
        ctx.generated_errors.extend(generated);
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorCode;

    #[test]
    fn test_unmarked_failures_merge_into_one_invalid_header() {
        let failures = vec![
            ValidationFailure::warning("Service is odd"),
            ValidationFailure::failure("Action is missing"),
        ];
        let errors = build_ebms_errors("m1@example.com", &failures);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, ErrorCode::InvalidHeader);
        assert_eq!(errors[0].severity, Severity::Failure);
        assert_eq!(
            errors[0].detail.as_deref(),
            Some(
                "The message was found to be invalid!\n2 validation error(s) found in the message:\nService is odd\nAction is missing\n"
            )
        );
        assert_eq!(
            errors[0].ref_to_message_in_error.as_deref(),
            Some("m1@example.com")
        );
    }

    #[test]
    fn test_marked_failure_gets_own_error() {
        let failures = vec![
            ValidationFailure::warning("Role is unusual"),
            ValidationFailure::failure("Service is not a URI").inconsistent(),
        ];
        let errors = build_ebms_errors("m1@example.com", &failures);

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].error_code, ErrorCode::ValueInconsistent);
        assert_eq!(errors[0].detail.as_deref(), Some("Service is not a URI"));
        assert_eq!(errors[1].error_code, ErrorCode::InvalidHeader);
        assert_eq!(errors[1].severity, Severity::Warning);
    }

    #[test]
    fn test_only_marked_failures_produce_no_invalid_header() {
        let failures = vec![ValidationFailure::failure("PartyId is not a URI").inconsistent()];
        let errors = build_ebms_errors("m1@example.com", &failures);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code, ErrorCode::ValueInconsistent);
    }
}
