use crate::models::{MessageUnitEntity, MessageUnitType};
use crate::validation::ValidationFailure;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What happened to the subject message unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum EventKind {
    /// The transport could not send the message containing the unit
    MessageTransferFailure { reason: String },
    /// The message containing the unit was sent successfully
    MessageTransferred,
    /// A User Message was received that was already delivered before
    DuplicateReceived,
    /// The header of a received unit is invalid. `failure` is the first failure found; when a
    /// validator itself failed only `reason` is set.
    HeaderValidationFailure {
        failure: Option<ValidationFailure>,
        reason: Option<String>,
    },
    SigningFailure { reason: String },
    EncryptionFailure { reason: String },
    /// The security header of the received message could not be verified
    SecurityVerificationFailure { reason: String },
    /// No Receipt was received after the last retransmission
    MissingReceipt { attempts: usize },
    ReceiptReceived { receipt_message_id: String },
    /// The business application did not accept the unit
    DeliveryFailure { reason: String },
    /// The unit is about to be removed from storage
    MessageUnitPurged,
}

impl EventKind {
    /// Names of all event kinds, as used in handler filters
    pub const NAMES: [&'static str; 11] = [
        "MessageTransferFailure",
        "MessageTransferred",
        "DuplicateReceived",
        "HeaderValidationFailure",
        "SigningFailure",
        "EncryptionFailure",
        "SecurityVerificationFailure",
        "MissingReceipt",
        "ReceiptReceived",
        "DeliveryFailure",
        "MessageUnitPurged",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageTransferFailure { .. } => "MessageTransferFailure",
            Self::MessageTransferred => "MessageTransferred",
            Self::DuplicateReceived => "DuplicateReceived",
            Self::HeaderValidationFailure { .. } => "HeaderValidationFailure",
            Self::SigningFailure { .. } => "SigningFailure",
            Self::EncryptionFailure { .. } => "EncryptionFailure",
            Self::SecurityVerificationFailure { .. } => "SecurityVerificationFailure",
            Self::MissingReceipt { .. } => "MissingReceipt",
            Self::ReceiptReceived { .. } => "ReceiptReceived",
            Self::DeliveryFailure { .. } => "DeliveryFailure",
            Self::MessageUnitPurged => "MessageUnitPurged",
        }
    }
}

/// An event raised while processing a message unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    /// Snapshot of the message unit at the time the event was raised
    pub subject: Option<MessageUnitEntity>,
}

impl ProcessingEvent {
    pub fn new(kind: EventKind, subject: &MessageUnitEntity) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            subject: Some(subject.clone()),
        }
    }

    /// An event that does not refer to a message unit. The notifier drops these.
    pub fn without_subject(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            subject: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn subject(&self) -> Option<&MessageUnitEntity> {
        self.subject.as_ref()
    }

    pub fn subject_type(&self) -> Option<MessageUnitType> {
        self.subject.as_ref().map(MessageUnitEntity::unit_type)
    }
}
