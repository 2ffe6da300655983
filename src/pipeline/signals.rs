//! # Signal Processing Stage
//!
//! Processes the received signal message units: Receipts complete the reliable exchange of the
//! User Message they acknowledge, Error signals report the failure of a sent message unit and
//! Pull Requests are only registered. Receipts and Errors can be passed on to the business
//! application when the leg of the referenced message asks for it.

use super::delivery::{deliver_unit, DeliveryAttempt};
use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::collaborators::MessageDeliverer;
use crate::core::Core;
use crate::events::EventKind;
use crate::models::{
    Direction, EbmsError, ErrorCode, MessageUnitEntity, MessageUnitType, Severity,
};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SignalProcessingStage {
    core: Core,
    deliverer: Arc<dyn MessageDeliverer>,
}

impl std::fmt::Debug for SignalProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalProcessingStage").finish_non_exhaustive()
    }
}

impl SignalProcessingStage {
    pub fn new(core: Core, deliverer: Arc<dyn MessageDeliverer>) -> Self {
        Self { core, deliverer }
    }

    async fn referenced_units(
        &self,
        signal: &MessageUnitEntity,
    ) -> PipelineResult<Vec<MessageUnitEntity>> {
        let ref_to = signal.ref_to_message_id().or_else(|| {
            signal
                .unit()
                .as_error_message()
                .and_then(|em| em.errors.iter().find_map(|e| e.ref_to_message_in_error.as_deref()))
        });
        let Some(ref_to) = ref_to else {
            return Ok(Vec::new());
        };
        Ok(self
            .core
            .registry()
            .find_by_message_id(ref_to, Some(Direction::Out))
            .await?)
    }

    /// Finish a processed signal: deliver it when configured, otherwise it is done
    async fn complete_signal(
        &self,
        signal: &mut MessageUnitEntity,
        notify: bool,
    ) -> PipelineResult<()> {
        self.core
            .registry()
            .set_state(signal, ProcessingState::ReadyForDelivery, None)
            .await?;
        if !notify {
            self.core
                .registry()
                .set_state(signal, ProcessingState::Done, None)
                .await?;
            return Ok(());
        }

        let attempt = deliver_unit(
            &self.core,
            self.deliverer.as_ref(),
            signal,
            ProcessingState::Done,
            ProcessingState::Warning,
        )
        .await?;
        if let DeliveryAttempt::Failed(failure) = attempt {
            self.core
                .raise(
                    EventKind::DeliveryFailure {
                        reason: failure.to_string(),
                    },
                    signal,
                )
                .await;
        }
        Ok(())
    }

    pub async fn process_receipt(
        &self,
        receipt: &mut MessageUnitEntity,
    ) -> PipelineResult<Option<EbmsError>> {
        let referenced = self.referenced_units(receipt).await?;
        let Some(mut acknowledged) = referenced
            .into_iter()
            .find(|u| u.unit_type() == MessageUnitType::UserMessage)
        else {
            warn!(
                message_id = %receipt.message_id(),
                ref_to = receipt.ref_to_message_id().unwrap_or_default(),
                "Receipt does not reference a sent User Message"
            );
            self.core
                .registry()
                .set_state(receipt, ProcessingState::Failure, Some("Unknown reference"))
                .await?;
            return Ok(Some(
                EbmsError::new(
                    ErrorCode::ValueNotRecognized,
                    Some(receipt.message_id().to_string()),
                )
                .with_detail("Receipt references an unknown message"),
            ));
        };

        let outcome = self
            .core
            .registry()
            .set_state_if(
                &mut acknowledged,
                ProcessingState::AwaitingReceipt,
                ProcessingState::Delivered,
                Some("Receipt received"),
            )
            .await?;
        if outcome.is_applied() {
            info!(
                message_id = %acknowledged.message_id(),
                receipt_id = %receipt.message_id(),
                "Receipt received for User Message"
            );
            self.core
                .raise(
                    EventKind::ReceiptReceived {
                        receipt_message_id: receipt.message_id().to_string(),
                    },
                    &acknowledged,
                )
                .await;
        } else {
            debug!(
                message_id = %acknowledged.message_id(),
                current_state = %acknowledged.current_state(),
                "User Message was not waiting for a Receipt"
            );
        }

        let notify = self
            .core
            .leg_of(&acknowledged)
            .and_then(|leg| leg.receipt)
            .is_some_and(|rc| rc.notify_business_application);
        self.complete_signal(receipt, notify).await?;
        Ok(None)
    }

    async fn process_signal(
        &self,
        entity: &mut MessageUnitEntity,
    ) -> PipelineResult<Option<EbmsError>> {
        match entity.unit_type() {
            MessageUnitType::Receipt => self.process_receipt(entity).await,
            MessageUnitType::ErrorMessage => self.process_error(entity).await.map(|()| None),
            MessageUnitType::PullRequest => {
                self.core
                    .registry()
                    .set_state(entity, ProcessingState::Done, None)
                    .await?;
                Ok(None)
            }
            MessageUnitType::UserMessage => Ok(None),
        }
    }

    pub async fn process_error(&self, signal: &mut MessageUnitEntity) -> PipelineResult<()> {
        let only_warnings = signal.unit().as_error_message().is_some_and(|em| {
            !em.errors.is_empty() && em.errors.iter().all(|e| e.severity == Severity::Warning)
        });
        let new_state = if only_warnings {
            ProcessingState::Warning
        } else {
            ProcessingState::Failure
        };

        let mut notify = false;
        let referenced = self.referenced_units(signal).await?;
        if referenced.is_empty() {
            warn!(
                message_id = %signal.message_id(),
                "Error signal does not reference a sent message unit"
            );
        }
        for mut unit in referenced {
            info!(
                message_id = %unit.message_id(),
                error_signal = %signal.message_id(),
                state = %new_state,
                "Sent message unit is in error"
            );
            self.core
                .registry()
                .set_state(&mut unit, new_state, Some("Error signal received"))
                .await?;
            notify |= self
                .core
                .leg_of(&unit)
                .and_then(|leg| leg.error_handling)
                .is_some_and(|eh| eh.notify_business_application);
        }

        self.complete_signal(signal, notify).await
    }
}

#[async_trait]
impl PipelineStage for SignalProcessingStage {
    fn name(&self) -> &'static str {
        "SignalProcessing"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut generated = Vec::new();
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            if entity.current_state() == ProcessingState::Processing {
                match self.process_signal(&mut entity).await {
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
