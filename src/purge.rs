//! # Purging of Old Message Units
//!
//! Removes message units whose processing state has not changed for longer than the configured
//! retention period. Handlers get a `MessageUnitPurged` event for every unit before it is
//! removed, so they can still read its meta-data.

use crate::core::Core;
use crate::events::EventKind;
use crate::logging::log_error;
use crate::models::MessageUnitEntity;
use crate::pipeline::PipelineResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone)]
pub struct MessageUnitPurger {
    core: Core,
    sweep_interval: Duration,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for MessageUnitPurger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageUnitPurger")
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl MessageUnitPurger {
    pub fn new(core: Core) -> Self {
        let sweep_interval = core.config().purge.sweep_interval();
        Self {
            core,
            sweep_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Remove one message unit. Returns whether it still existed.
    pub async fn purge(&self, entity: &MessageUnitEntity) -> PipelineResult<bool> {
        self.core.raise(EventKind::MessageUnitPurged, entity).await;
        let removed = self.core.registry().remove(entity).await?;
        debug!(
            message_id = %entity.message_id(),
            internal_id = %entity.internal_id(),
            removed,
            "Purged message unit"
        );
        Ok(removed)
    }

    /// Remove all message units whose last state change was before `cutoff`
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> PipelineResult<usize> {
        let expired = self.core.registry().find_changed_before(cutoff).await?;
        let mut purged = 0;
        for entity in &expired {
            match self.purge(entity).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => log_error(
                    "MessageUnitPurger",
                    "purge",
                    &e.to_string(),
                    Some(entity.message_id()),
                ),
            }
        }
        if purged > 0 {
            info!(purged, cutoff = %cutoff, "Purged expired message units");
        }
        Ok(purged)
    }

    /// Remove the message units older than the configured retention period
    pub async fn purge_expired(&self) -> PipelineResult<usize> {
        let cutoff = Utc::now() - self.core.config().purge.retention();
        self.purge_older_than(cutoff).await
    }

    /// Purge expired units in the background until [`MessageUnitPurger::shutdown`] is called
    pub fn spawn(&self) -> JoinHandle<()> {
        let purger = self.clone();
        tokio::spawn(async move {
            info!(
                sweep_interval_ms = purger.sweep_interval.as_millis() as u64,
                retention_days = purger.core.config().purge.retention_days,
                "Starting message unit purger"
            );
            loop {
                if let Err(e) = purger.purge_expired().await {
                    log_error("MessageUnitPurger", "purge_expired", &e.to_string(), None);
                }
                tokio::select! {
                    _ = tokio::time::sleep(purger.sweep_interval) => {},
                    _ = purger.shutdown.notified() => {
                        debug!("Shutdown notification received");
                        break;
                    }
                }
            }
            info!("Message unit purger stopped");
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
