//! # Security Stages
//!
//! Bridge between the pipeline and the [`SecurityProvider`]. The provider does the WS-Security
//! work; these stages turn its outcome into processing states, ebMS errors and events.

use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::collaborators::{SecurityError, SecurityProvider, SecurityResult};
use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_stage_decision;
use crate::models::{EbmsError, ErrorCode, MessageUnitEntity, MessageUnitType};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Verifies the security header of the received message and checks the signature covers all
/// payloads
pub struct SecurityVerificationStage {
    core: Core,
    provider: Arc<dyn SecurityProvider>,
}

impl std::fmt::Debug for SecurityVerificationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityVerificationStage").finish_non_exhaustive()
    }
}

impl SecurityVerificationStage {
    pub fn new(core: Core, provider: Arc<dyn SecurityProvider>) -> Self {
        Self { core, provider }
    }

    async fn reject_all(&self, ctx: &mut MessageProcessingContext, failure: &SecurityError) {
        let code = match failure {
            SecurityError::Decryption { .. } => ErrorCode::FailedDecryption,
            _ => ErrorCode::FailedAuthentication,
        };
        let mut generated = Vec::new();
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            if entity.current_state() != ProcessingState::Received {
                kept.push(entity);
                continue;
            }
            if let Err(e) = self
                .core
                .registry()
                .set_state(&mut entity, ProcessingState::Failure, Some(failure.reason()))
                .await
            {
                log_unit_failure("SecurityVerification", &entity, &e.into());
                continue;
            }
            generated.push(
                EbmsError::new(code, Some(entity.message_id().to_string()))
                    .with_detail(failure.reason()),
            );
            self.core
                .raise(
                    EventKind::SecurityVerificationFailure {
                        reason: failure.to_string(),
                    },
                    &entity,
                )
                .await;
            log_stage_decision(
                "SecurityVerification",
                entity.message_id(),
                "rejected",
                Some(failure.reason()),
            );
            kept.push(entity);
        }
        ctx.received_units = kept;
        ctx.generated_errors.extend(generated);
    }

    /// A signed message must sign every payload of its User Messages
    async fn check_signature_coverage(
        &self,
        entity: &mut MessageUnitEntity,
        result: &SecurityResult,
    ) -> PipelineResult<Option<EbmsError>> {
        let Some(user_message) = entity.unit().as_user_message() else {
            return Ok(None);
        };
        let unsigned: Vec<String> = user_message
            .payloads
            .iter()
            .filter(|p| !result.payload_digests.contains(&p.content_id))
            .map(|p| p.content_id.clone())
            .collect();
        if unsigned.is_empty() {
            return Ok(None);
        }

        let detail = format!("Payload(s) not covered by signature: {}", unsigned.join(", "));
        warn!(message_id = %entity.message_id(), detail = %detail, "Signature is incomplete");
        self.core
            .registry()
            .set_state(entity, ProcessingState::Failure, Some("Incomplete signature"))
            .await?;
        self.core
            .raise(
                EventKind::SecurityVerificationFailure {
                    reason: detail.clone(),
                },
                entity,
            )
            .await;
        Ok(Some(
            EbmsError::new(
                ErrorCode::PolicyNoncompliance,
                Some(entity.message_id().to_string()),
            )
            .with_detail(detail),
        ))
    }
}

#[async_trait]
impl PipelineStage for SecurityVerificationStage {
    fn name(&self) -> &'static str {
        "SecurityVerification"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let result = match self.provider.verify_inbound(&ctx.raw_message).await {
            Ok(result) => result,
            Err(failure) => {
                error!(
                    exchange_id = %ctx.exchange_id,
                    error = %failure,
                    "Security header of received message could not be processed"
                );
                self.reject_all(ctx, &failure).await;
                return Ok(StageOutcome::Continue);
            }
        };
        debug!(
            exchange_id = %ctx.exchange_id,
            signed = result.signed,
            encrypted = result.encrypted,
            "Security header processed"
        );

        if result.signed {
            let mut generated = Vec::new();
            let mut kept = Vec::with_capacity(ctx.received_units.len());
            for mut entity in std::mem::take(&mut ctx.received_units) {
                if entity.unit_type() == MessageUnitType::UserMessage
                    && entity.current_state() == ProcessingState::Received
                {
                    match self.check_signature_coverage(&mut entity, &result).await {
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
        }
        ctx.security_result = Some(result);
        Ok(StageOutcome::Continue)
    }
}

/// Signs and/or encrypts the message to be sent. A failure stops the message from being sent.
pub struct SecurityCreationStage {
    core: Core,
    provider: Arc<dyn SecurityProvider>,
}

impl std::fmt::Debug for SecurityCreationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityCreationStage").finish_non_exhaustive()
    }
}

impl SecurityCreationStage {
    pub fn new(core: Core, provider: Arc<dyn SecurityProvider>) -> Self {
        Self { core, provider }
    }
}

#[async_trait]
impl PipelineStage for SecurityCreationStage {
    fn name(&self) -> &'static str {
        "SecurityCreation"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        // The primary unit determines the security settings of the whole message
        let pmode = ctx
            .sending_units
            .iter()
            .find(|u| u.unit_type() == MessageUnitType::UserMessage)
            .or_else(|| ctx.sending_units.first())
            .and_then(|u| self.core.pmode_of(u));
        let sender = pmode.as_ref().and_then(|p| p.sender_security.as_ref());
        let receiver = pmode.as_ref().and_then(|p| p.receiver_security.as_ref());

        let Err(failure) = self
            .provider
            .create_outbound_headers(&ctx.sending_units, sender, receiver)
            .await
        else {
            return Ok(StageOutcome::Continue);
        };

        error!(
            exchange_id = %ctx.exchange_id,
            error = %failure,
            "Security header of message to send could not be created"
        );
        for entity in ctx.sending_units.iter_mut() {
            if let Err(e) = self
                .core
                .registry()
                .set_state(entity, ProcessingState::Failure, Some(failure.reason()))
                .await
            {
                log_unit_failure(self.name(), entity, &e.into());
                continue;
            }
            let kind = match &failure {
                SecurityError::Encryption { reason } => EventKind::EncryptionFailure {
                    reason: reason.clone(),
                },
                other => EventKind::SigningFailure {
                    reason: other.reason().to_string(),
                },
            };
            self.core.raise(kind, entity).await;
        }
        Ok(StageOutcome::abort(failure.to_string()))
    }
}
