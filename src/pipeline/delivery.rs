//! # Delivery Stage
//!
//! Hands received User Messages to the business application. The change from
//! READY_FOR_DELIVERY to OUT_FOR_DELIVERY is a compare-and-append, so a message unit is
//! delivered at most once even when two flows reach this point for the same unit.

use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::collaborators::{deliver_guarded, MessageDeliverer, MessageDeliveryError};
use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_stage_decision;
use crate::models::{EbmsError, ErrorCode, MessageUnitEntity, MessageUnitType};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a delivery attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAttempt {
    Delivered,
    /// Another flow already took the unit out for delivery
    Skipped,
    Failed(MessageDeliveryError),
}

/// Deliver a unit in READY_FOR_DELIVERY, moving it to `delivered_state` on success and to
/// `failed_state` on failure
pub(crate) async fn deliver_unit(
    core: &Core,
    deliverer: &dyn MessageDeliverer,
    entity: &mut MessageUnitEntity,
    delivered_state: ProcessingState,
    failed_state: ProcessingState,
) -> PipelineResult<DeliveryAttempt> {
    let claimed = core
        .registry()
        .set_state_if(
            entity,
            ProcessingState::ReadyForDelivery,
            ProcessingState::OutForDelivery,
            None,
        )
        .await?;
    if !claimed.is_applied() {
        info!(
            message_id = %entity.message_id(),
            current_state = %entity.current_state(),
            "Message unit is already out for delivery"
        );
        return Ok(DeliveryAttempt::Skipped);
    }

    match deliver_guarded(deliverer, entity).await {
        Ok(()) => {
            core.registry()
                .set_state(entity, delivered_state, None)
                .await?;
            debug!(message_id = %entity.message_id(), "Message unit delivered");
            Ok(DeliveryAttempt::Delivered)
        }
        Err(failure) => {
            warn!(
                message_id = %entity.message_id(),
                error = %failure,
                "Message unit could not be delivered"
            );
            core.registry()
                .set_state(entity, failed_state, Some(&failure.to_string()))
                .await?;
            Ok(DeliveryAttempt::Failed(failure))
        }
    }
}

pub struct DeliveryStage {
    core: Core,
    deliverer: Arc<dyn MessageDeliverer>,
}

impl std::fmt::Debug for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryStage").finish_non_exhaustive()
    }
}

impl DeliveryStage {
    pub fn new(core: Core, deliverer: Arc<dyn MessageDeliverer>) -> Self {
        Self { core, deliverer }
    }

    /// Deliver one User Message. Returns the ebMS error to report when delivery failed.
    async fn deliver(&self, entity: &mut MessageUnitEntity) -> PipelineResult<Option<EbmsError>> {
        self.core
            .registry()
            .set_state(entity, ProcessingState::ReadyForDelivery, None)
            .await?;

        let attempt = deliver_unit(
            &self.core,
            self.deliverer.as_ref(),
            entity,
            ProcessingState::Delivered,
            ProcessingState::Failure,
        )
        .await?;

        let DeliveryAttempt::Failed(failure) = attempt else {
            return Ok(None);
        };
        log_stage_decision(
            self.name(),
            entity.message_id(),
            "delivery_failed",
            Some(&failure.to_string()),
        );
        self.core
            .raise(
                EventKind::DeliveryFailure {
                    reason: failure.to_string(),
                },
                entity,
            )
            .await;
        Ok(Some(
            EbmsError::new(
                ErrorCode::DeliveryFailure,
                Some(entity.message_id().to_string()),
            )
            .with_detail(failure.to_string()),
        ))
    }
}

#[async_trait]
impl PipelineStage for DeliveryStage {
    fn name(&self) -> &'static str {
        "Delivery"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut generated = Vec::new();
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            if entity.unit_type() == MessageUnitType::UserMessage
                && entity.current_state() == ProcessingState::Processing
            {
                match self.deliver(&mut entity).await {
                    Ok(error) => generated.extend(error),
                    Err(e) => {
                        log_unit_failure(self.name(), &entity, &e);
                        continue;
                    }
                }
            }
            kept.push(entity);
        }
        ctx.received_units = kept;
        ctx.generated_errors.extend(generated);
        Ok(StageOutcome::Continue)
    }
}
