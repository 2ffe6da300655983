//! Outbound check that every payload carried in the message can actually be packaged.

use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::core::Core;
use crate::logging::log_stage_decision;
use crate::models::{Containment, PayloadInfo};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PayloadCheckStage {
    core: Core,
}

impl PayloadCheckStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

/// Payloads inside the message need a location to read their content from
fn missing_content(payloads: &[PayloadInfo]) -> Vec<&str> {
    payloads
        .iter()
        .filter(|p| {
            matches!(p.containment, Containment::Attachment | Containment::Body)
                && p.content_location.as_deref().unwrap_or_default().is_empty()
        })
        .map(|p| p.content_id.as_str())
        .collect()
}

#[async_trait]
impl PipelineStage for PayloadCheckStage {
    fn name(&self) -> &'static str {
        "PayloadCheck"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut rejected = Vec::new();
        for entity in ctx.sending_units.iter_mut() {
            let Some(user_message) = entity.unit().as_user_message() else {
                continue;
            };
            let missing = missing_content(&user_message.payloads).join(", ");
            if missing.is_empty() {
                continue;
            }

            let reason = format!("No content available for payload(s): {missing}");
            warn!(message_id = %entity.message_id(), reason = %reason, "Message cannot be sent");
            // The message is not sent either way
            if let Err(e) = self
                .core
                .registry()
                .set_state(entity, ProcessingState::Failure, Some(&reason))
                .await
            {
                log_unit_failure(self.name(), entity, &e.into());
            }
            log_stage_decision(self.name(), entity.message_id(), "abort", Some(&reason));
            rejected.push(entity.message_id().to_string());
        }

        if rejected.is_empty() {
            Ok(StageOutcome::Continue)
        } else {
            Ok(StageOutcome::abort(format!(
                "Payload content missing for {}",
                rejected.join(", ")
            )))
        }
    }
}
