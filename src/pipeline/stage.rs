use super::context::MessageProcessingContext;
use super::errors::{PipelineError, PipelineResult};
use crate::logging::log_error;
use crate::models::MessageUnitEntity;
use async_trait::async_trait;

/// What the pipeline should do after a stage ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    /// Stop processing this message. Stages that already ran still get `flow_complete`.
    Abort { reason: String },
}

impl StageOutcome {
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
        }
    }
}

/// One step in the inbound or outbound processing of a message
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome>;

    /// Called after the message was processed, in reverse stage order, for every stage whose
    /// `process` was invoked
    async fn flow_complete(&self, _ctx: &mut MessageProcessingContext) -> PipelineResult<()> {
        Ok(())
    }
}

/// Log a failure that concerns one message unit only. The stage leaves that unit out of the
/// rest of the flow and goes on with the other units of the message.
pub fn log_unit_failure(stage: &str, entity: &MessageUnitEntity, error: &PipelineError) {
    log_error(stage, "process", &error.to_string(), Some(entity.message_id()));
}
