//! Duplicate elimination for received User Messages.
//!
//! A received User Message is a duplicate when another received instance with the same message
//! id was already delivered. Only DELIVERED and DONE count; an instance that ended in WARNING
//! does not block a new delivery.

use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_stage_decision;
use crate::models::{Direction, MessageUnitEntity, MessageUnitType};
use crate::pipeline::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DuplicateDetectionStage {
    core: Core,
}

impl DuplicateDetectionStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    /// Check one received User Message, marking it DUPLICATE when it was delivered before.
    /// Returns whether the unit was marked.
    pub async fn check(&self, entity: &mut MessageUnitEntity) -> PipelineResult<bool> {
        let detection_enabled = self
            .core
            .leg_of(entity)
            .is_some_and(|leg| leg.duplicate_detection());
        if !detection_enabled {
            debug!(message_id = %entity.message_id(), "Duplicate detection not enabled for leg");
            return Ok(false);
        }

        let previous = self
            .core
            .registry()
            .find_by_message_id(entity.message_id(), Some(Direction::In))
            .await?;
        let delivered_before = previous.iter().any(|other| {
            other.internal_id() != entity.internal_id()
                && other.current_state().is_successfully_delivered()
        });
        if !delivered_before {
            return Ok(false);
        }

        let outcome = self
            .core
            .registry()
            .set_state_if(
                entity,
                ProcessingState::Received,
                ProcessingState::Duplicate,
                Some("Already delivered"),
            )
            .await?;
        if !outcome.is_applied() {
            return Ok(false);
        }

        info!(
            message_id = %entity.message_id(),
            internal_id = %entity.internal_id(),
            "Received User Message is a duplicate"
        );
        log_stage_decision("DuplicateDetection", entity.message_id(), "duplicate", None);
        self.core.raise(EventKind::DuplicateReceived, entity).await;
        Ok(true)
    }
}

#[async_trait]
impl PipelineStage for DuplicateDetectionStage {
    fn name(&self) -> &'static str {
        "DuplicateDetection"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            if entity.unit_type() == MessageUnitType::UserMessage
                && entity.current_state() == ProcessingState::Received
            {
                if let Err(e) = self.check(&mut entity).await {
                    log_unit_failure(self.name(), &entity, &e);
                    continue;
                }
            }
            kept.push(entity);
        }
        ctx.received_units = kept;
        Ok(StageOutcome::Continue)
    }
}
