use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing states a message unit can be in.
///
/// The set is closed. States carry no numeric rank: the order in which a message unit moves
/// through them is defined by the pipeline stages, and the only enforced rule is the
/// compare-and-append guard on the persisted current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// Outgoing signal created by the engine itself
    Created,
    /// Outgoing User Message accepted from the business application
    Submitted,
    /// Incoming message unit read from the message
    Received,
    /// Outgoing message unit waiting to be pushed to the partner
    ReadyToPush,
    /// Incoming User Message being processed
    Processing,
    /// Message unit is being transmitted
    Sending,
    /// User Message sent, waiting for the Receipt to arrive
    AwaitingReceipt,
    /// Message unit successfully transferred or delivered
    Delivered,
    /// Incoming message unit can be delivered to the business application
    ReadyForDelivery,
    /// Delivery to the business application in progress
    OutForDelivery,
    /// Processing completed
    Done,
    /// Processing completed, but with a non-fatal issue
    Warning,
    /// Processing failed
    Failure,
    /// The transport layer could not transfer the message
    TransportFailure,
    /// Incoming User Message was already received and delivered before
    Duplicate,
}

impl ProcessingState {
    /// All states, in declaration order.
    pub const ALL: [ProcessingState; 15] = [
        Self::Created,
        Self::Submitted,
        Self::Received,
        Self::ReadyToPush,
        Self::Processing,
        Self::Sending,
        Self::AwaitingReceipt,
        Self::Delivered,
        Self::ReadyForDelivery,
        Self::OutForDelivery,
        Self::Done,
        Self::Warning,
        Self::Failure,
        Self::TransportFailure,
        Self::Duplicate,
    ];

    /// Check if processing of the message unit has ended in this state
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Delivered
                | Self::Done
                | Self::Warning
                | Self::Failure
                | Self::TransportFailure
                | Self::Duplicate
        )
    }

    /// Check if this state means the message unit was successfully processed.
    ///
    /// Only these states block a re-delivery of a User Message with the same message id.
    /// `Warning` does not count.
    pub fn is_successfully_delivered(&self) -> bool {
        matches!(self, Self::Delivered | Self::Done)
    }

    /// Check if this state indicates a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::TransportFailure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Submitted => "SUBMITTED",
            Self::Received => "RECEIVED",
            Self::ReadyToPush => "READY_TO_PUSH",
            Self::Processing => "PROCESSING",
            Self::Sending => "SENDING",
            Self::AwaitingReceipt => "AWAITING_RECEIPT",
            Self::Delivered => "DELIVERED",
            Self::ReadyForDelivery => "READY_FOR_DELIVERY",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Done => "DONE",
            Self::Warning => "WARNING",
            Self::Failure => "FAILURE",
            Self::TransportFailure => "TRANSPORT_FAILURE",
            Self::Duplicate => "DUPLICATE",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Invalid processing state: {s}"))
    }
}
