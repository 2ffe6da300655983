//! # Processing Pipelines
//!
//! A message is processed by an ordered list of stages sharing one
//! [`MessageProcessingContext`]. The inbound pipeline stores, checks and delivers the units of
//! a received message and creates the response signals; the outbound pipeline checks, secures
//! and transmits the units of a message to send.

pub mod context;
pub mod delivery;
pub mod errors;
pub mod inbound;
pub mod orchestrator;
pub mod payloads;
pub mod response;
pub mod security;
pub mod signals;
pub mod stage;
pub mod submission;
pub mod transmission;

pub use context::{Flow, MessageProcessingContext, NEXT_MSH_ROLE};
pub use delivery::{DeliveryAttempt, DeliveryStage};
pub use errors::{PipelineError, PipelineResult};
pub use inbound::{MultiHopStage, StartProcessingStage, StoreReceivedStage};
pub use orchestrator::{MessageProcessor, MessageProcessorBuilder, ProcessingReport};
pub use payloads::PayloadCheckStage;
pub use response::{bundle_errors, ResponseSignalStage};
pub use security::{SecurityCreationStage, SecurityVerificationStage};
pub use signals::SignalProcessingStage;
pub use stage::{log_unit_failure, PipelineStage, StageOutcome};
pub use submission::MessageSubmitter;
pub use transmission::TransmissionStage;
