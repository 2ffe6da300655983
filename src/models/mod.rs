//! # Data Models
//!
//! Protocol values (message units and ebMS errors) and the registry-managed entity wrapping
//! them.

pub mod ebms_error;
pub mod entity;
pub mod message_unit;

pub use ebms_error::{EbmsError, ErrorCode, Severity};
pub use entity::MessageUnitEntity;
pub use message_unit::{
    generate_message_id, CollaborationInfo, Containment, Direction, ErrorMessage, LegLabel, MessageUnit,
    MessageUnitContent, MessageUnitType, PartyId, PayloadInfo, PullRequest, Receipt, Service,
    TradingPartner, UserMessage,
};
