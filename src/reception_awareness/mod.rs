//! # Reception Awareness
//!
//! The reliability features of AS4 built on Receipts: detection of duplicate User Messages on
//! the receiving side and retransmission of User Messages for which no Receipt arrived on the
//! sending side.

pub mod duplicates;
pub mod retry;

pub use duplicates::DuplicateDetectionStage;
pub use retry::{decide, Resender, RetryDecision, RetryScheduler, SweepSummary, MISSING_RECEIPT};
