//! # External Collaborators
//!
//! Interfaces to the parts of the message handler that live outside the processing core: the
//! WS-Security implementation, the transport sending physical messages and the delivery of
//! message units to the business application.

pub mod delivery;
pub mod security;
pub mod transport;

pub use delivery::{deliver_guarded, MessageDeliverer, MessageDeliveryError};
pub use security::{SecurityError, SecurityProvider, SecurityResult};
pub use transport::{PhysicalMessage, Transport, TransportOutcome};
