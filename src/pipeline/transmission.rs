//! # Transmission Stage
//!
//! Marks the message units being sent as SENDING before the transport is called and records
//! the result once the transport returned. The result handling runs per unit; a storage
//! failure for one unit is logged and the remaining units are still updated.

use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_error;
use crate::models::{MessageUnitEntity, MessageUnitType};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TransmissionStage {
    core: Core,
}

impl TransmissionStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    /// State of a successfully sent unit
    fn sent_state(&self, entity: &MessageUnitEntity) -> ProcessingState {
        if entity.unit_type() != MessageUnitType::UserMessage {
            return ProcessingState::Delivered;
        }
        let expects_receipt = self
            .core
            .leg_of(entity)
            .is_some_and(|leg| leg.expects_receipt());
        if expects_receipt {
            ProcessingState::AwaitingReceipt
        } else {
            ProcessingState::Delivered
        }
    }

    async fn record_result(
        &self,
        entity: &mut MessageUnitEntity,
        failure_reason: Option<&str>,
    ) -> PipelineResult<()> {
        match failure_reason {
            Some(reason) => {
                self.core
                    .registry()
                    .set_state(entity, ProcessingState::TransportFailure, Some(reason))
                    .await?;
                self.core
                    .raise(
                        EventKind::MessageTransferFailure {
                            reason: reason.to_string(),
                        },
                        entity,
                    )
                    .await;
            }
            None => {
                let new_state = self.sent_state(entity);
                self.core
                    .registry()
                    .set_state(entity, new_state, None)
                    .await?;
                self.core.raise(EventKind::MessageTransferred, entity).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStage for TransmissionStage {
    fn name(&self) -> &'static str {
        "Transmission"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut kept = Vec::with_capacity(ctx.sending_units.len());
        for mut entity in std::mem::take(&mut ctx.sending_units) {
            match self
                .core
                .registry()
                .set_state(&mut entity, ProcessingState::Sending, None)
                .await
            {
                Ok(_) => kept.push(entity),
                Err(e) => log_unit_failure(self.name(), &entity, &e.into()),
            }
        }
        ctx.sending_units = kept;
        if ctx.sending_units.is_empty() {
            return Ok(StageOutcome::abort("No message unit could be prepared for sending"));
        }
        debug!(
            exchange_id = %ctx.exchange_id,
            units = ctx.sending_units.len(),
            "Message units ready for transmission"
        );
        Ok(StageOutcome::Continue)
    }

    async fn flow_complete(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<()> {
        let failure_reason = match &ctx.transport_outcome {
            Some(outcome) => outcome.failure_reason.clone(),
            None => Some("Message was not sent".to_string()),
        };
        match &failure_reason {
            Some(reason) => warn!(
                exchange_id = %ctx.exchange_id,
                reason = %reason,
                "Message could not be transferred"
            ),
            None => info!(exchange_id = %ctx.exchange_id, "Message successfully transferred"),
        }

        for entity in ctx.sending_units.iter_mut() {
            if let Err(e) = self.record_result(entity, failure_reason.as_deref()).await {
                log_error(
                    "TransmissionStage",
                    "record_result",
                    &e.to_string(),
                    Some(entity.message_id()),
                );
            }
        }
        Ok(())
    }
}
