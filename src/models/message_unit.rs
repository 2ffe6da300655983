//! # Message Units
//!
//! Protocol-level content of the four ebMS message unit types. These are plain values; the
//! engine-managed identity and processing state live on [`MessageUnitEntity`].
//!
//! [`MessageUnitEntity`]: super::entity::MessageUnitEntity

use super::ebms_error::EbmsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Domain part of message ids generated by this engine
pub const GENERATED_ID_DOMAIN: &str = "ebms-core.local";

/// Generate a new globally unique message id of the form `uuid@domain`
pub fn generate_message_id() -> String {
    format!("{}@{GENERATED_ID_DOMAIN}", Uuid::new_v4())
}

/// Whether a message unit was received or is being sent by this engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            _ => Err(format!("Invalid direction: {s}")),
        }
    }
}

/// Leg of the P-Mode on which the message unit is exchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegLabel {
    #[default]
    Request,
    Reply,
}

impl LegLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
        }
    }
}

impl std::str::FromStr for LegLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUEST" => Ok(Self::Request),
            "REPLY" => Ok(Self::Reply),
            _ => Err(format!("Invalid leg label: {s}")),
        }
    }
}

/// Type of a message unit, used for handler filters and validator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageUnitType {
    UserMessage,
    Receipt,
    ErrorMessage,
    PullRequest,
}

impl MessageUnitType {
    pub const ALL: [MessageUnitType; 4] = [
        Self::UserMessage,
        Self::Receipt,
        Self::ErrorMessage,
        Self::PullRequest,
    ];

    pub fn is_signal(&self) -> bool {
        !matches!(self, Self::UserMessage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserMessage => "UserMessage",
            Self::Receipt => "Receipt",
            Self::ErrorMessage => "ErrorMessage",
            Self::PullRequest => "PullRequest",
        }
    }
}

impl fmt::Display for MessageUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageUnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid message unit type: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyId {
    pub id: String,
    pub party_type: Option<String>,
}

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            party_type: None,
        }
    }

    pub fn typed(id: impl Into<String>, party_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            party_type: Some(party_type.into()),
        }
    }
}

/// Sender or receiver of a User Message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradingPartner {
    pub party_ids: Vec<PartyId>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollaborationInfo {
    pub service: Service,
    pub action: String,
    pub conversation_id: Option<String>,
    pub agreement_ref: Option<String>,
}

/// How a payload is carried with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    Attachment,
    Body,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadInfo {
    /// Reference to the payload within the message, e.g. `cid:part1@example.com`
    pub content_id: String,
    pub containment: Containment,
    /// Where the payload content can be read from when the message is packaged
    pub content_location: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserMessage {
    pub mpc: Option<String>,
    pub sender: TradingPartner,
    pub receiver: TradingPartner,
    pub collaboration: CollaborationInfo,
    pub payloads: Vec<PayloadInfo>,
}

/// Receipt signal. The content elements are opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Receipt {
    pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub errors: Vec<EbmsError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PullRequest {
    pub mpc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum MessageUnitContent {
    UserMessage(UserMessage),
    Receipt(Receipt),
    ErrorMessage(ErrorMessage),
    PullRequest(PullRequest),
}

impl MessageUnitContent {
    pub fn unit_type(&self) -> MessageUnitType {
        match self {
            Self::UserMessage(_) => MessageUnitType::UserMessage,
            Self::Receipt(_) => MessageUnitType::Receipt,
            Self::ErrorMessage(_) => MessageUnitType::ErrorMessage,
            Self::PullRequest(_) => MessageUnitType::PullRequest,
        }
    }
}

/// An ebMS message unit as read from or to be written into a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUnit {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub ref_to_message_id: Option<String>,
    pub direction: Direction,
    pub pmode_id: Option<String>,
    pub leg_label: LegLabel,
    pub content: MessageUnitContent,
}

impl MessageUnit {
    pub fn new(
        direction: Direction,
        message_id: impl Into<String>,
        content: MessageUnitContent,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            timestamp: Utc::now(),
            ref_to_message_id: None,
            direction,
            pmode_id: None,
            leg_label: LegLabel::Request,
            content,
        }
    }

    pub fn user_message(
        direction: Direction,
        message_id: impl Into<String>,
        user_message: UserMessage,
    ) -> Self {
        Self::new(
            direction,
            message_id,
            MessageUnitContent::UserMessage(user_message),
        )
    }

    pub fn receipt(
        direction: Direction,
        message_id: impl Into<String>,
        ref_to_message_id: impl Into<String>,
        receipt: Receipt,
    ) -> Self {
        Self::new(direction, message_id, MessageUnitContent::Receipt(receipt))
            .with_ref_to(ref_to_message_id)
    }

    pub fn error_message(
        direction: Direction,
        message_id: impl Into<String>,
        error_message: ErrorMessage,
    ) -> Self {
        Self::new(
            direction,
            message_id,
            MessageUnitContent::ErrorMessage(error_message),
        )
    }

    pub fn pull_request(
        direction: Direction,
        message_id: impl Into<String>,
        mpc: impl Into<String>,
    ) -> Self {
        Self::new(
            direction,
            message_id,
            MessageUnitContent::PullRequest(PullRequest { mpc: mpc.into() }),
        )
    }

    pub fn with_pmode(mut self, pmode_id: impl Into<String>) -> Self {
        self.pmode_id = Some(pmode_id.into());
        self
    }

    pub fn with_ref_to(mut self, ref_to_message_id: impl Into<String>) -> Self {
        self.ref_to_message_id = Some(ref_to_message_id.into());
        self
    }

    pub fn with_leg(mut self, leg_label: LegLabel) -> Self {
        self.leg_label = leg_label;
        self
    }

    pub fn unit_type(&self) -> MessageUnitType {
        self.content.unit_type()
    }

    pub fn as_user_message(&self) -> Option<&UserMessage> {
        match &self.content {
            MessageUnitContent::UserMessage(um) => Some(um),
            _ => None,
        }
    }

    pub fn as_error_message(&self) -> Option<&ErrorMessage> {
        match &self.content {
            MessageUnitContent::ErrorMessage(em) => Some(em),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_type_of_content() {
        let um = MessageUnit::user_message(Direction::Out, "m1@example.com", UserMessage::default());
        assert_eq!(um.unit_type(), MessageUnitType::UserMessage);
        assert!(um.as_user_message().is_some());

        let rcpt = MessageUnit::receipt(Direction::In, "r1@example.com", "m1@example.com", Receipt::default());
        assert_eq!(rcpt.unit_type(), MessageUnitType::Receipt);
        assert!(rcpt.unit_type().is_signal());
        assert_eq!(rcpt.ref_to_message_id.as_deref(), Some("m1@example.com"));
    }

    #[test]
    fn test_unit_serde_round_trip_keeps_variant() {
        let unit = MessageUnit::pull_request(Direction::In, "pr@example.com", "urn:mpc:default")
            .with_pmode("pm-1")
            .with_leg(LegLabel::Reply);
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["content"]["type"], "PullRequest");
        assert_eq!(json["direction"], "IN");

        let back: MessageUnit = serde_json::from_value(json).unwrap();
        assert_eq!(back, unit);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert_ne!(a, b);
        assert!(a.ends_with("@ebms-core.local"));
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(
            "ErrorMessage".parse::<MessageUnitType>().unwrap(),
            MessageUnitType::ErrorMessage
        );
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Out);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
