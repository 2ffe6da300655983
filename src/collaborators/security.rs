use crate::models::MessageUnitEntity;
use crate::pmode::SecurityConfig;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

/// What the security provider found in the security header of a received message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityResult {
    pub signed: bool,
    pub encrypted: bool,
    /// Payload references (content ids) covered by the signature
    pub payload_digests: HashSet<String>,
    /// SOAP role the security header was targeted at, if not the default
    pub target_role: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Signature verification failed: {reason}")]
    SignatureVerification { reason: String },

    #[error("Decryption failed: {reason}")]
    Decryption { reason: String },

    #[error("Signing failed: {reason}")]
    Signing { reason: String },

    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },

    #[error("Security processing failed: {reason}")]
    Other { reason: String },
}

impl SecurityError {
    pub fn reason(&self) -> &str {
        match self {
            Self::SignatureVerification { reason }
            | Self::Decryption { reason }
            | Self::Signing { reason }
            | Self::Encryption { reason }
            | Self::Other { reason } => reason,
        }
    }
}

/// WS-Security processing of physical messages
#[async_trait]
pub trait SecurityProvider: Send + Sync {
    /// Verify and decrypt the security header of a received message
    async fn verify_inbound(&self, raw_message: &[u8]) -> Result<SecurityResult, SecurityError>;

    /// Sign and/or encrypt the message that will carry the given units
    async fn create_outbound_headers(
        &self,
        units: &[MessageUnitEntity],
        sender: Option<&SecurityConfig>,
        receiver: Option<&SecurityConfig>,
    ) -> Result<(), SecurityError>;
}
