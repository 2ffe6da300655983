//! Creates the signals to return to the sender of a received message: Receipts for the User
//! Messages delivered (or already delivered before) and Error signals for the errors found.

use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::core::Core;
use crate::logging::log_error;
use crate::models::{
    generate_message_id, Direction, EbmsError, ErrorMessage, MessageUnit, MessageUnitEntity,
    MessageUnitType, Receipt,
};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ResponseSignalStage {
    core: Core,
}

impl ResponseSignalStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    async fn create_receipt(
        &self,
        acknowledged: &MessageUnitEntity,
    ) -> PipelineResult<MessageUnitEntity> {
        let mut unit = MessageUnit::receipt(
            Direction::Out,
            generate_message_id(),
            acknowledged.message_id(),
            Receipt {
                content: vec![acknowledged.message_id().to_string()],
            },
        )
        .with_leg(acknowledged.leg_label());
        if let Some(pmode_id) = acknowledged.pmode_id() {
            unit = unit.with_pmode(pmode_id);
        }
        let receipt = self.core.registry().store_outgoing(unit).await?;
        debug!(
            message_id = %receipt.message_id(),
            ref_to = %acknowledged.message_id(),
            "Created Receipt"
        );
        Ok(receipt)
    }

    async fn create_error_signal(
        &self,
        ctx: &MessageProcessingContext,
        ref_to: Option<String>,
        errors: Vec<EbmsError>,
    ) -> PipelineResult<MessageUnitEntity> {
        let mut unit = MessageUnit::error_message(
            Direction::Out,
            generate_message_id(),
            ErrorMessage { errors },
        );
        if let Some(ref_to) = ref_to {
            if let Some(in_error) = ctx.received_unit(&ref_to) {
                unit = unit.with_leg(in_error.leg_label());
                if let Some(pmode_id) = in_error.pmode_id() {
                    unit = unit.with_pmode(pmode_id);
                }
            }
            unit = unit.with_ref_to(ref_to);
        }
        let signal = self.core.registry().store_outgoing(unit).await?;
        debug!(
            message_id = %signal.message_id(),
            ref_to = signal.ref_to_message_id().unwrap_or_default(),
            "Created Error signal"
        );
        Ok(signal)
    }
}

/// Group errors by the message unit they refer to, in order of first appearance
pub fn bundle_errors(errors: Vec<EbmsError>) -> Vec<(Option<String>, Vec<EbmsError>)> {
    let mut bundles: Vec<(Option<String>, Vec<EbmsError>)> = Vec::new();
    for error in errors {
        match bundles
            .iter_mut()
            .find(|(ref_to, _)| *ref_to == error.ref_to_message_in_error)
        {
            Some((_, bundle)) => bundle.push(error),
            None => bundles.push((error.ref_to_message_in_error.clone(), vec![error])),
        }
    }
    bundles
}

#[async_trait]
impl PipelineStage for ResponseSignalStage {
    fn name(&self) -> &'static str {
        "ResponseSignals"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut responses = Vec::new();

        for entity in &ctx.received_units {
            if entity.unit_type() != MessageUnitType::UserMessage
                || !matches!(
                    entity.current_state(),
                    ProcessingState::Delivered | ProcessingState::Duplicate
                )
            {
                continue;
            }
            let wants_receipt = self
                .core
                .leg_of(entity)
                .is_some_and(|leg| leg.expects_receipt());
            if wants_receipt {
                match self.create_receipt(entity).await {
                    Ok(receipt) => responses.push(receipt),
                    Err(e) => log_unit_failure(self.name(), entity, &e),
                }
            }
        }

        let errors = std::mem::take(&mut ctx.generated_errors);
        for (ref_to, bundle) in bundle_errors(errors.clone()) {
            match self.create_error_signal(ctx, ref_to.clone(), bundle).await {
                Ok(signal) => responses.push(signal),
                Err(e) => log_error(
                    self.name(),
                    "create_error_signal",
                    &e.to_string(),
                    ref_to.as_deref(),
                ),
            }
        }
        ctx.generated_errors = errors;

        ctx.response_units.extend(responses);
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorCode;

    #[test]
    fn test_errors_are_bundled_per_reference() {
        let errors = vec![
            EbmsError::invalid_header("bad", Some("a@example.com")),
            EbmsError::new(ErrorCode::DeliveryFailure, Some("b@example.com".into())),
            EbmsError::value_inconsistent("odd", Some("a@example.com")),
            EbmsError::other_content_error("Internal error", None),
        ];
        let bundles = bundle_errors(errors);

        assert_eq!(bundles.len(), 3);
        assert_eq!(bundles[0].0.as_deref(), Some("a@example.com"));
        assert_eq!(bundles[0].1.len(), 2);
        assert_eq!(bundles[1].0.as_deref(), Some("b@example.com"));
        assert_eq!(bundles[2].0, None);
    }
}
