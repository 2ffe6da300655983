//! # Message Processor
//!
//! Runs the inbound and outbound pipelines. Stages run one after another in their configured
//! order, each awaited to completion. A stage returning [`StageOutcome::Abort`] or an error
//! stops the pipeline for this message only; every stage that was invoked still gets its
//! `flow_complete` call, in reverse order.
//!
//! On the outbound side the transport is called between the last stage's `process` and the
//! first `flow_complete`, and only when no stage aborted.

use super::delivery::DeliveryStage;
use super::inbound::{MultiHopStage, StartProcessingStage, StoreReceivedStage};
use super::payloads::PayloadCheckStage;
use super::response::ResponseSignalStage;
use super::security::{SecurityCreationStage, SecurityVerificationStage};
use super::signals::SignalProcessingStage;
use super::submission::MessageSubmitter;
use super::transmission::TransmissionStage;
use super::{
    Flow, MessageProcessingContext, PipelineError, PipelineResult, PipelineStage, StageOutcome,
};
use crate::collaborators::{
    MessageDeliverer, PhysicalMessage, SecurityProvider, Transport, TransportOutcome,
};
use crate::config::ConfigurationError;
use crate::core::Core;
use crate::logging::log_error;
use crate::models::{EbmsError, MessageUnit, MessageUnitEntity};
use crate::reception_awareness::{DuplicateDetectionStage, Resender};
use crate::validation::{HeaderValidationStage, ValidatorSetRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to one message in a pipeline
#[derive(Debug)]
pub struct ProcessingReport {
    pub exchange_id: Uuid,
    pub flow: Flow,
    /// Received units that took part in the whole flow, with their final state
    pub received_units: Vec<MessageUnitEntity>,
    pub sending_units: Vec<MessageUnitEntity>,
    /// Signals to return to the sender of the received message
    pub response_units: Vec<MessageUnitEntity>,
    pub generated_errors: Vec<EbmsError>,
    pub transport_outcome: Option<TransportOutcome>,
    /// Name of the stage that aborted the flow and its reason
    pub aborted: Option<(String, String)>,
}

impl ProcessingReport {
    fn from_context(ctx: MessageProcessingContext, aborted: Option<(String, String)>) -> Self {
        Self {
            exchange_id: ctx.exchange_id,
            flow: ctx.flow,
            received_units: ctx.received_units,
            sending_units: ctx.sending_units,
            response_units: ctx.response_units,
            generated_errors: ctx.generated_errors,
            transport_outcome: ctx.transport_outcome,
            aborted,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

enum RunResult {
    Completed,
    Aborted { stage: String, reason: String },
    Failed(PipelineError),
}

pub struct MessageProcessor {
    core: Core,
    inbound: Vec<Box<dyn PipelineStage>>,
    outbound: Vec<Box<dyn PipelineStage>>,
    transport: Arc<dyn Transport>,
    submitter: MessageSubmitter,
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("inbound", &self.inbound.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("outbound", &self.outbound.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MessageProcessor {
    pub fn builder(core: Core) -> MessageProcessorBuilder {
        MessageProcessorBuilder {
            core,
            transport: None,
            deliverer: None,
            security: None,
            validator_sets: None,
        }
    }

    /// Processor with custom stage lists
    pub fn with_stages(
        core: Core,
        inbound: Vec<Box<dyn PipelineStage>>,
        outbound: Vec<Box<dyn PipelineStage>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let submitter = MessageSubmitter::new(core.clone());
        Self {
            core,
            inbound,
            outbound,
            transport,
            submitter,
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn inbound_stages(&self) -> Vec<&'static str> {
        self.inbound.iter().map(|s| s.name()).collect()
    }

    pub fn outbound_stages(&self) -> Vec<&'static str> {
        self.outbound.iter().map(|s| s.name()).collect()
    }

    /// Process a received message
    pub async fn process_inbound(
        &self,
        mut ctx: MessageProcessingContext,
    ) -> PipelineResult<ProcessingReport> {
        info!(
            exchange_id = %ctx.exchange_id,
            units = ctx.parsed_units.len(),
            "Processing received message"
        );
        let (invoked, result) = run_stages(&self.inbound, &mut ctx).await;
        complete_flow(&self.inbound[..invoked], &mut ctx).await;
        finish(ctx, result)
    }

    /// Accept a User Message from the business application for sending
    pub async fn submit(&self, unit: MessageUnit) -> PipelineResult<MessageUnitEntity> {
        self.submitter.submit(unit).await
    }

    /// Send the given message units together in one message
    pub async fn process_outbound(
        &self,
        units: Vec<MessageUnitEntity>,
    ) -> PipelineResult<ProcessingReport> {
        let mut ctx = MessageProcessingContext::outbound(units);
        info!(
            exchange_id = %ctx.exchange_id,
            units = ctx.sending_units.len(),
            "Processing message to send"
        );
        let (invoked, result) = run_stages(&self.outbound, &mut ctx).await;

        if matches!(result, RunResult::Completed) {
            let message = PhysicalMessage {
                exchange_id: ctx.exchange_id,
                units: ctx.sending_units.clone(),
            };
            let outcome = self.transport.send(&message).await;
            debug!(
                exchange_id = %ctx.exchange_id,
                success = outcome.is_success(),
                "Transport finished"
            );
            ctx.transport_outcome = Some(outcome);
        }

        complete_flow(&self.outbound[..invoked], &mut ctx).await;
        finish(ctx, result)
    }

    /// Submit a User Message and send it right away
    pub async fn submit_and_send(&self, unit: MessageUnit) -> PipelineResult<ProcessingReport> {
        let entity = self.submit(unit).await?;
        self.process_outbound(vec![entity]).await
    }
}

#[async_trait]
impl Resender for MessageProcessor {
    async fn resend(&self, entity: MessageUnitEntity) -> PipelineResult<()> {
        let internal_id = entity.internal_id();
        let report = self.process_outbound(vec![entity]).await?;
        if let Some((stage, reason)) = report.aborted {
            warn!(stage = %stage, reason = %reason, "Resend was aborted");
            return Err(PipelineError::stage(stage, reason));
        }
        if !report
            .sending_units
            .iter()
            .any(|u| u.internal_id() == internal_id)
        {
            return Err(PipelineError::stage(
                "Transmission",
                "Message unit dropped from the message to send",
            ));
        }
        Ok(())
    }
}

/// Returns how many stages were invoked and how the run ended
async fn run_stages(
    stages: &[Box<dyn PipelineStage>],
    ctx: &mut MessageProcessingContext,
) -> (usize, RunResult) {
    for (index, stage) in stages.iter().enumerate() {
        debug!(exchange_id = %ctx.exchange_id, stage = stage.name(), "Running stage");
        match stage.process(ctx).await {
            Ok(StageOutcome::Continue) => {}
            Ok(StageOutcome::Abort { reason }) => {
                warn!(
                    exchange_id = %ctx.exchange_id,
                    stage = stage.name(),
                    reason = %reason,
                    "Processing of message aborted"
                );
                return (
                    index + 1,
                    RunResult::Aborted {
                        stage: stage.name().to_string(),
                        reason,
                    },
                );
            }
            Err(e) => {
                log_error(
                    stage.name(),
                    "process",
                    &e.to_string(),
                    Some(&ctx.exchange_id.to_string()),
                );
                return (index + 1, RunResult::Failed(e));
            }
        }
    }
    (stages.len(), RunResult::Completed)
}

async fn complete_flow(invoked: &[Box<dyn PipelineStage>], ctx: &mut MessageProcessingContext) {
    for stage in invoked.iter().rev() {
        if let Err(e) = stage.flow_complete(ctx).await {
            log_error(
                stage.name(),
                "flow_complete",
                &e.to_string(),
                Some(&ctx.exchange_id.to_string()),
            );
        }
    }
}

fn finish(ctx: MessageProcessingContext, result: RunResult) -> PipelineResult<ProcessingReport> {
    match result {
        RunResult::Completed => Ok(ProcessingReport::from_context(ctx, None)),
        RunResult::Aborted { stage, reason } => {
            Ok(ProcessingReport::from_context(ctx, Some((stage, reason))))
        }
        RunResult::Failed(e) => Err(e),
    }
}

/// Builds a [`MessageProcessor`] with the standard stages
pub struct MessageProcessorBuilder {
    core: Core,
    transport: Option<Arc<dyn Transport>>,
    deliverer: Option<Arc<dyn MessageDeliverer>>,
    security: Option<Arc<dyn SecurityProvider>>,
    validator_sets: Option<Arc<ValidatorSetRegistry>>,
}

impl MessageProcessorBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn deliverer(mut self, deliverer: Arc<dyn MessageDeliverer>) -> Self {
        self.deliverer = Some(deliverer);
        self
    }

    /// Without a security provider no security processing takes place
    pub fn security(mut self, security: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn validator_sets(mut self, sets: Arc<ValidatorSetRegistry>) -> Self {
        self.validator_sets = Some(sets);
        self
    }

    pub fn build(self) -> PipelineResult<MessageProcessor> {
        let core = self.core;
        let transport = self.transport.ok_or_else(|| {
            ConfigurationError::missing_required_field("transport", "message processor")
        })?;
        let deliverer = self.deliverer.ok_or_else(|| {
            ConfigurationError::missing_required_field("deliverer", "message processor")
        })?;
        let validator_sets = self
            .validator_sets
            .unwrap_or_else(|| Arc::new(ValidatorSetRegistry::new()));
        let header_validation = HeaderValidationStage::new(core.clone(), &validator_sets)?;

        let mut inbound: Vec<Box<dyn PipelineStage>> = vec![
            Box::new(StoreReceivedStage::new(core.clone())),
            Box::new(MultiHopStage::new(core.clone())),
        ];
        if let Some(security) = &self.security {
            inbound.push(Box::new(SecurityVerificationStage::new(
                core.clone(),
                Arc::clone(security),
            )));
        }
        inbound.push(Box::new(header_validation));
        inbound.push(Box::new(DuplicateDetectionStage::new(core.clone())));
        inbound.push(Box::new(StartProcessingStage::new(core.clone())));
        inbound.push(Box::new(DeliveryStage::new(core.clone(), Arc::clone(&deliverer))));
        inbound.push(Box::new(SignalProcessingStage::new(core.clone(), deliverer)));
        inbound.push(Box::new(ResponseSignalStage::new(core.clone())));

        let mut outbound: Vec<Box<dyn PipelineStage>> =
            vec![Box::new(PayloadCheckStage::new(core.clone()))];
        if let Some(security) = self.security {
            outbound.push(Box::new(SecurityCreationStage::new(core.clone(), security)));
        }
        outbound.push(Box::new(TransmissionStage::new(core.clone())));

        Ok(MessageProcessor::with_stages(core, inbound, outbound, transport))
    }
}
