#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # ebMS Core
//!
//! Message processing state machine and reliability pipeline for an ebMS3 / AS4 message
//! handler.
//!
//! ## Overview
//!
//! Every message unit the handler receives or sends is registered with an append-only history
//! of processing states. The pipeline stages move units through these states using a
//! compare-and-append on the persisted current state, which keeps concurrent actors (two
//! deliveries of the same message, a resend racing an incoming Receipt) from acting on the same
//! unit twice.
//!
//! Parsing and packaging of SOAP/MIME messages, WS-Security and the transport itself are not
//! part of this crate; they plug in through the traits in [`collaborators`].
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Processing states and the append-only state history
//! - [`models`] - Message units, ebMS errors and the registry-managed entity
//! - [`storage`] - Storage providers and the message unit registry
//! - [`events`] - Processing events, handler factories and the event notifier
//! - [`validation`] - Header validators and the header validation stage
//! - [`pipeline`] - Inbound and outbound pipeline stages and the message processor
//! - [`reception_awareness`] - Duplicate detection and retransmission
//! - [`purge`] - Removal of expired message units
//! - [`config`] - Engine configuration loading
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ebms_core::collaborators::{MessageDeliverer, Transport};
//! use ebms_core::config::EngineConfig;
//! use ebms_core::core::Core;
//! use ebms_core::events::EventHandlerFactoryRegistry;
//! use ebms_core::pipeline::MessageProcessor;
//! use ebms_core::pmode::PModeSet;
//! use ebms_core::storage::InMemoryStorageProvider;
//! use std::sync::Arc;
//!
//! # fn example(
//! #     transport: Arc<dyn Transport>,
//! #     deliverer: Arc<dyn MessageDeliverer>,
//! # ) -> ebms_core::Result<()> {
//! let core = Core::new(
//!     EngineConfig::default(),
//!     Arc::new(InMemoryStorageProvider::new()),
//!     Arc::new(PModeSet::new()),
//!     Arc::new(EventHandlerFactoryRegistry::new()),
//! );
//! let processor = MessageProcessor::builder(core)
//!     .transport(transport)
//!     .deliverer(deliverer)
//!     .build()?;
//! println!("Inbound stages: {:?}", processor.inbound_stages());
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod pmode;
pub mod purge;
pub mod reception_awareness;
pub mod state_machine;
pub mod storage;
pub mod validation;

pub use config::{ConfigManager, ConfigurationError, EngineConfig};
pub use error::{EbmsCoreError, Result};
pub use models::{
    Direction, EbmsError, ErrorCode, MessageUnit, MessageUnitEntity, MessageUnitType, Severity,
};
pub use pipeline::{MessageProcessingContext, MessageProcessor, ProcessingReport};
pub use state_machine::{ProcessingState, ProcessingStateRecord, TransitionOutcome};
pub use storage::{MessageUnitRegistry, StorageProvider};
