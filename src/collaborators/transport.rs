use crate::models::MessageUnitEntity;
use async_trait::async_trait;
use uuid::Uuid;

/// The message units sent together in one physical message
#[derive(Debug, Clone)]
pub struct PhysicalMessage {
    pub exchange_id: Uuid,
    pub units: Vec<MessageUnitEntity>,
}

/// Result of sending a physical message. Sending succeeded when there is no failure reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOutcome {
    pub failure_reason: Option<String>,
}

impl TransportOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &PhysicalMessage) -> TransportOutcome;
}
