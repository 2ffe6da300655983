//! # Retransmission of Unacknowledged User Messages
//!
//! The retry scheduler periodically looks at every sent User Message that is waiting for a
//! Receipt. Each wait interval configured on the leg covers one transmission: after the first
//! send the first interval applies, after the first resend the second one, and so on. When the
//! interval belonging to the latest transmission has passed the message is resent, unless that
//! was the last interval, in which case the message has failed because of a missing Receipt.
//!
//! All changes are compare-and-append on AWAITING_RECEIPT. A Receipt that arrives while the
//! sweep runs wins over the sweep, and the sweep leaves the message alone.

use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_error;
use crate::models::{MessageUnitEntity, MessageUnitType};
use crate::pipeline::{PipelineError, PipelineResult};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Description of the failure state set when no Receipt arrived in time
pub const MISSING_RECEIPT: &str = "missing receipt";

/// Puts a User Message that is READY_TO_PUSH on the wire again
#[async_trait]
pub trait Resender: Send + Sync {
    async fn resend(&self, entity: MessageUnitEntity) -> PipelineResult<()>;
}

/// What to do with a User Message waiting for a Receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The current interval has not passed yet
    Wait,
    Resend,
    /// No more retransmissions left
    Fail,
}

/// Decide on a waiting User Message that was transmitted `sends` times and has been waiting
/// since `waiting_since`
pub fn decide(
    intervals: &[Duration],
    sends: usize,
    waiting_since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RetryDecision {
    let index = sends.saturating_sub(1);
    let Some(interval) = intervals.get(index) else {
        return RetryDecision::Fail;
    };
    // A start time in the future counts as no time waited
    let waited = (now - waiting_since).to_std().unwrap_or_default();
    if waited < *interval {
        RetryDecision::Wait
    } else if index + 1 < intervals.len() {
        RetryDecision::Resend
    } else {
        RetryDecision::Fail
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub examined: usize,
    pub resent: usize,
    pub failed: usize,
    /// Units changed by someone else during the sweep, or that could not be handled
    pub skipped: usize,
}

#[derive(Clone)]
pub struct RetryScheduler {
    core: Core,
    resender: Arc<dyn Resender>,
    sweep_interval: Duration,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl RetryScheduler {
    /// Scheduler sweeping at the interval set in the engine configuration
    pub fn new(core: Core, resender: Arc<dyn Resender>) -> Self {
        let sweep_interval = core.config().retry.sweep_interval();
        Self {
            core,
            resender,
            sweep_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Check all User Messages waiting for a Receipt
    pub async fn sweep(&self) -> PipelineResult<SweepSummary> {
        self.sweep_at(Utc::now()).await
    }

    /// Check all User Messages waiting for a Receipt, as if it is `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> PipelineResult<SweepSummary> {
        let waiting = self
            .core
            .registry()
            .find_in_state(MessageUnitType::UserMessage, ProcessingState::AwaitingReceipt)
            .await?;
        let mut summary = SweepSummary::default();

        for entity in waiting {
            summary.examined += 1;
            let message_id = entity.message_id().to_string();
            match self.check(entity, now).await {
                Ok(Some(RetryDecision::Resend)) => summary.resent += 1,
                Ok(Some(RetryDecision::Fail)) => summary.failed += 1,
                Ok(Some(RetryDecision::Wait)) => {}
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    summary.skipped += 1;
                    log_error("RetryScheduler", "check", &e.to_string(), Some(&message_id));
                }
            }
        }

        if summary.resent + summary.failed > 0 {
            info!(
                examined = summary.examined,
                resent = summary.resent,
                failed = summary.failed,
                skipped = summary.skipped,
                "Retry sweep completed"
            );
        }
        Ok(summary)
    }

    /// Returns the decision carried out, `None` when the unit was left alone
    async fn check(
        &self,
        mut entity: MessageUnitEntity,
        now: DateTime<Utc>,
    ) -> PipelineResult<Option<RetryDecision>> {
        let Some(config) = self
            .core
            .leg_of(&entity)
            .and_then(|leg| leg.reception_awareness)
        else {
            debug!(message_id = %entity.message_id(), "No reception awareness configured for leg");
            return Ok(None);
        };

        let sends = entity.state_log().count_of(ProcessingState::Sending);
        let waiting_since = entity.current_record().start_time;
        let decision = decide(&config.wait_intervals, sends, waiting_since, now);

        match decision {
            RetryDecision::Wait => Ok(Some(RetryDecision::Wait)),
            RetryDecision::Resend => {
                let outcome = self
                    .core
                    .registry()
                    .set_state_if(
                        &mut entity,
                        ProcessingState::AwaitingReceipt,
                        ProcessingState::ReadyToPush,
                        Some("Resending"),
                    )
                    .await?;
                if !outcome.is_applied() {
                    return Ok(None);
                }
                info!(
                    message_id = %entity.message_id(),
                    attempt = sends + 1,
                    "Resending User Message"
                );
                if let Err(e) = self.resender.resend(entity.clone()).await {
                    if let Err(cleanup) = self.resend_failed(&mut entity, &e).await {
                        log_error(
                            "RetryScheduler",
                            "resend_failed",
                            &cleanup.to_string(),
                            Some(entity.message_id()),
                        );
                    }
                    return Err(e);
                }
                Ok(Some(RetryDecision::Resend))
            }
            RetryDecision::Fail => {
                let outcome = self
                    .core
                    .registry()
                    .set_state_if(
                        &mut entity,
                        ProcessingState::AwaitingReceipt,
                        ProcessingState::Failure,
                        Some(MISSING_RECEIPT),
                    )
                    .await?;
                if !outcome.is_applied() {
                    return Ok(None);
                }
                warn!(
                    message_id = %entity.message_id(),
                    attempts = sends,
                    "No Receipt received for User Message"
                );
                self.core
                    .raise(EventKind::MissingReceipt { attempts: sends }, &entity)
                    .await;
                Ok(Some(RetryDecision::Fail))
            }
        }
    }

    /// Move a unit whose resend failed out of READY_TO_PUSH, where no sweep would find it again.
    /// Leaves the unit alone when the resend got it past READY_TO_PUSH.
    async fn resend_failed(
        &self,
        entity: &mut MessageUnitEntity,
        error: &PipelineError,
    ) -> PipelineResult<()> {
        let reason = format!("Resend failed: {error}");
        let outcome = self
            .core
            .registry()
            .set_state_if(
                entity,
                ProcessingState::ReadyToPush,
                ProcessingState::TransportFailure,
                Some(&reason),
            )
            .await?;
        if outcome.is_applied() {
            warn!(message_id = %entity.message_id(), reason = %reason, "Resend of User Message failed");
            self.core
                .raise(EventKind::MessageTransferFailure { reason }, entity)
                .await;
        }
        Ok(())
    }

    /// Run the sweep in the background until [`RetryScheduler::shutdown`] is called
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            info!(
                sweep_interval_ms = scheduler.sweep_interval.as_millis() as u64,
                "Starting retry scheduler"
            );
            loop {
                if let Err(e) = scheduler.sweep().await {
                    log_error("RetryScheduler", "sweep", &e.to_string(), None);
                }
                tokio::select! {
                    _ = tokio::time::sleep(scheduler.sweep_interval) => {},
                    _ = scheduler.shutdown.notified() => {
                        debug!("Shutdown notification received");
                        break;
                    }
                }
            }
            info!("Retry scheduler stopped");
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
