use crate::events::notifier::panic_message;
use crate::models::MessageUnitEntity;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageDeliveryError {
    /// The business application rejected or could not take the message unit
    #[error("Delivery failed: {reason}")]
    Failed { reason: String },

    /// The deliverer broke down instead of reporting a failure
    #[error("Unhandled error during message delivery: {reason}")]
    Unhandled { reason: String },
}

impl MessageDeliveryError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Hands message units over to the business application
#[async_trait]
pub trait MessageDeliverer: Send + Sync {
    async fn deliver(&self, entity: &MessageUnitEntity) -> Result<(), MessageDeliveryError>;
}

/// Deliver a message unit, turning a panicking deliverer into [`MessageDeliveryError::Unhandled`]
pub async fn deliver_guarded(
    deliverer: &dyn MessageDeliverer,
    entity: &MessageUnitEntity,
) -> Result<(), MessageDeliveryError> {
    match AssertUnwindSafe(deliverer.deliver(entity)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(MessageDeliveryError::Unhandled {
            reason: panic_message(panic.as_ref()),
        }),
    }
}
