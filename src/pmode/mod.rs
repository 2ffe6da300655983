//! # Processing Modes
//!
//! The parts of a P-Mode the processing core acts on: per-leg receipt, reception awareness and
//! error handling settings, event handler configurations and the opaque security settings
//! passed through to the security provider. Parsing P-Mode documents is left to the embedding
//! application, which registers the parsed P-Modes with a [`PModeSet`].

pub mod lookup;

use crate::events::EventHandlerConfig;
use crate::models::LegLabel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use lookup::{PModeLookup, PModeSet};

/// A processing mode governing how message units are exchanged with a trading partner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingMode {
    pub id: String,
    /// Use strict header validation for message units governed by this P-Mode
    pub strict_header_validation: bool,
    pub legs: Vec<Leg>,
    /// P-Mode level event handlers, consulted after the leg level ones
    pub event_handlers: Vec<EventHandlerConfig>,
    pub sender_security: Option<SecurityConfig>,
    pub receiver_security: Option<SecurityConfig>,
}

impl ProcessingMode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_leg(mut self, leg: Leg) -> Self {
        self.legs.retain(|l| l.label != leg.label);
        self.legs.push(leg);
        self
    }

    pub fn with_event_handler(mut self, handler: EventHandlerConfig) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_header_validation = true;
        self
    }

    pub fn leg(&self, label: LegLabel) -> Option<&Leg> {
        self.legs.iter().find(|l| l.label == label)
    }
}

/// Settings of one leg of a P-Mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Leg {
    pub label: LegLabel,
    /// When present, Receipts are expected for (outbound) and sent for (inbound) User Messages
    pub receipt: Option<ReceiptConfiguration>,
    pub reception_awareness: Option<ReceptionAwarenessConfig>,
    pub error_handling: Option<ErrorHandlingConfig>,
    pub event_handlers: Vec<EventHandlerConfig>,
}

impl Leg {
    pub fn new(label: LegLabel) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    pub fn with_receipt(mut self, receipt: ReceiptConfiguration) -> Self {
        self.receipt = Some(receipt);
        self
    }

    pub fn with_reception_awareness(mut self, config: ReceptionAwarenessConfig) -> Self {
        self.reception_awareness = Some(config);
        self
    }

    pub fn with_error_handling(mut self, config: ErrorHandlingConfig) -> Self {
        self.error_handling = Some(config);
        self
    }

    pub fn with_event_handler(mut self, handler: EventHandlerConfig) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn expects_receipt(&self) -> bool {
        self.receipt.is_some()
    }

    pub fn duplicate_detection(&self) -> bool {
        self.reception_awareness
            .as_ref()
            .is_some_and(|ra| ra.duplicate_detection)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptConfiguration {
    /// Deliver received Receipts to the business application
    pub notify_business_application: bool,
}

/// Retransmission and duplicate detection settings of a leg
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceptionAwarenessConfig {
    /// Ordered waits for a Receipt. With N intervals a message is resent at most N - 1 times.
    #[serde(with = "duration_millis")]
    pub wait_intervals: Vec<Duration>,
    pub duplicate_detection: bool,
}

impl ReceptionAwarenessConfig {
    pub fn new(wait_intervals: Vec<Duration>) -> Self {
        Self {
            wait_intervals,
            duplicate_detection: false,
        }
    }

    pub fn with_duplicate_detection(mut self) -> Self {
        self.duplicate_detection = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    /// Deliver received Error signals to the business application
    pub notify_business_application: bool,
}

/// Security settings of one side of the exchange. The content is interpreted only by the
/// security provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub settings: HashMap<String, String>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = values
            .iter()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Duration>, D::Error> {
        let millis = Vec::<u64>::deserialize(deserializer)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}
