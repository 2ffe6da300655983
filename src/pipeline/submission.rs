//! Acceptance of User Messages submitted by the business application for sending.

use super::{PipelineError, PipelineResult};
use crate::core::Core;
use crate::models::{Direction, MessageUnit, MessageUnitEntity, MessageUnitType};
use crate::state_machine::ProcessingState;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MessageSubmitter {
    core: Core,
}

impl MessageSubmitter {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    /// Register a User Message for sending. The returned unit is READY_TO_PUSH.
    pub async fn submit(&self, unit: MessageUnit) -> PipelineResult<MessageUnitEntity> {
        if unit.unit_type() != MessageUnitType::UserMessage {
            return Err(PipelineError::invalid_submission(format!(
                "only User Messages can be submitted, got {}",
                unit.unit_type()
            )));
        }
        if unit.direction != Direction::Out {
            return Err(PipelineError::invalid_submission(
                "submitted message must be outgoing",
            ));
        }
        let Some(pmode_id) = unit.pmode_id.clone() else {
            return Err(PipelineError::invalid_submission(
                "submitted message has no P-Mode",
            ));
        };
        if self.core.pmodes().resolve(&pmode_id).is_none() {
            return Err(PipelineError::UnknownPMode { pmode_id });
        }

        let mut entity = self.core.registry().store_outgoing(unit).await?;
        self.core
            .registry()
            .set_state_if(
                &mut entity,
                ProcessingState::Submitted,
                ProcessingState::ReadyToPush,
                None,
            )
            .await?;
        info!(
            message_id = %entity.message_id(),
            pmode_id = %pmode_id,
            state = %entity.current_state(),
            "User Message submitted"
        );
        Ok(entity)
    }
}
