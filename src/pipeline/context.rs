use crate::collaborators::{SecurityResult, TransportOutcome};
use crate::models::{EbmsError, MessageUnit, MessageUnitEntity};
use uuid::Uuid;

/// SOAP role an ebMS header is targeted at when the message travels through an intermediary
pub const NEXT_MSH_ROLE: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/part2/200811/nextmsh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Inbound,
    Outbound,
}

/// State of one message exchange as it moves through the pipeline stages
#[derive(Debug)]
pub struct MessageProcessingContext {
    pub exchange_id: Uuid,
    pub flow: Flow,
    /// The received message as read from the wire, passed to security verification
    pub raw_message: Vec<u8>,
    /// SOAP role of the received ebMS header, if one was set
    pub messaging_role: Option<String>,
    /// Message units read from the received message, not yet stored
    pub parsed_units: Vec<MessageUnit>,
    pub received_units: Vec<MessageUnitEntity>,
    pub sending_units: Vec<MessageUnitEntity>,
    pub security_result: Option<SecurityResult>,
    /// Errors found while processing the received message, to be reported in Error signals
    pub generated_errors: Vec<EbmsError>,
    /// Signals to send back to the sender of the received message
    pub response_units: Vec<MessageUnitEntity>,
    pub transport_outcome: Option<TransportOutcome>,
}

impl MessageProcessingContext {
    pub fn inbound(parsed_units: Vec<MessageUnit>, raw_message: Vec<u8>) -> Self {
        Self {
            exchange_id: Uuid::new_v4(),
            flow: Flow::Inbound,
            raw_message,
            messaging_role: None,
            parsed_units,
            received_units: Vec::new(),
            sending_units: Vec::new(),
            security_result: None,
            generated_errors: Vec::new(),
            response_units: Vec::new(),
            transport_outcome: None,
        }
    }

    pub fn outbound(sending_units: Vec<MessageUnitEntity>) -> Self {
        Self {
            exchange_id: Uuid::new_v4(),
            flow: Flow::Outbound,
            raw_message: Vec::new(),
            messaging_role: None,
            parsed_units: Vec::new(),
            received_units: Vec::new(),
            sending_units,
            security_result: None,
            generated_errors: Vec::new(),
            response_units: Vec::new(),
            transport_outcome: None,
        }
    }

    pub fn with_messaging_role(mut self, role: impl Into<String>) -> Self {
        self.messaging_role = Some(role.into());
        self
    }

    /// The message was routed through an intermediary
    pub fn is_multi_hop(&self) -> bool {
        self.messaging_role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(NEXT_MSH_ROLE))
    }

    /// Received unit with the given message id
    pub fn received_unit(&self, message_id: &str) -> Option<&MessageUnitEntity> {
        self.received_units
            .iter()
            .find(|u| u.message_id() == message_id)
    }

    pub fn add_generated_error(&mut self, error: EbmsError) {
        self.generated_errors.push(error);
    }
}
