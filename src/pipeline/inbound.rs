//! Stages that take a received message into the registry and claim its units for processing.
//!
//! A storage failure for one unit drops that unit from the flow; its siblings are still
//! processed.

use super::{
    log_unit_failure, MessageProcessingContext, PipelineResult, PipelineStage, StageOutcome,
};
use crate::core::Core;
use crate::logging::{log_error, log_stage_decision};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Stores every message unit read from the received message with state RECEIVED
#[derive(Debug, Clone)]
pub struct StoreReceivedStage {
    core: Core,
}

impl StoreReceivedStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

#[async_trait]
impl PipelineStage for StoreReceivedStage {
    fn name(&self) -> &'static str {
        "StoreReceived"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        if ctx.parsed_units.is_empty() {
            warn!(exchange_id = %ctx.exchange_id, "Received message contains no message units");
            return Ok(StageOutcome::abort("No message units in received message"));
        }

        for unit in std::mem::take(&mut ctx.parsed_units) {
            let message_id = unit.message_id.clone();
            match self.core.registry().store_received(unit).await {
                Ok(entity) => ctx.received_units.push(entity),
                Err(e) => log_error(self.name(), "store_received", &e.to_string(), Some(&message_id)),
            }
        }
        if ctx.received_units.is_empty() {
            return Ok(StageOutcome::abort("No message unit could be stored"));
        }
        debug!(
            exchange_id = %ctx.exchange_id,
            units = ctx.received_units.len(),
            "Stored received message units"
        );
        Ok(StageOutcome::Continue)
    }
}

/// Flags the received units when the message came in through an intermediary
#[derive(Debug, Clone)]
pub struct MultiHopStage {
    core: Core,
}

impl MultiHopStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

#[async_trait]
impl PipelineStage for MultiHopStage {
    fn name(&self) -> &'static str {
        "MultiHop"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        if !ctx.is_multi_hop() {
            return Ok(StageOutcome::Continue);
        }
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            match self.core.registry().set_multi_hop(&mut entity, true).await {
                Ok(()) => {
                    debug!(message_id = %entity.message_id(), "Message unit received using multi-hop");
                    kept.push(entity);
                }
                Err(e) => log_unit_failure(self.name(), &entity, &e.into()),
            }
        }
        ctx.received_units = kept;
        Ok(StageOutcome::Continue)
    }
}

/// Claims the received units that passed the checks so far.
///
/// Only one flow can move a unit from RECEIVED to PROCESSING. Units claimed by another flow are
/// dropped from this one.
#[derive(Debug, Clone)]
pub struct StartProcessingStage {
    core: Core,
}

impl StartProcessingStage {
    pub fn new(core: Core) -> Self {
        Self { core }
    }
}

#[async_trait]
impl PipelineStage for StartProcessingStage {
    fn name(&self) -> &'static str {
        "StartProcessing"
    }

    async fn process(&self, ctx: &mut MessageProcessingContext) -> PipelineResult<StageOutcome> {
        let mut kept = Vec::with_capacity(ctx.received_units.len());
        for mut entity in std::mem::take(&mut ctx.received_units) {
            if entity.current_state() != ProcessingState::Received {
                kept.push(entity);
                continue;
            }
            let outcome = match self
                .core
                .registry()
                .set_state_if(
                    &mut entity,
                    ProcessingState::Received,
                    ProcessingState::Processing,
                    None,
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    log_unit_failure(self.name(), &entity, &e.into());
                    continue;
                }
            };
            if outcome.is_applied() {
                kept.push(entity);
            } else {
                info!(
                    message_id = %entity.message_id(),
                    internal_id = %entity.internal_id(),
                    current_state = %entity.current_state(),
                    "Message unit is already being processed"
                );
                log_stage_decision(
                    self.name(),
                    entity.message_id(),
                    "removed",
                    Some("already being processed"),
                );
            }
        }
        ctx.received_units = kept;
        Ok(StageOutcome::Continue)
    }
}
