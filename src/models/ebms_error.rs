use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an ebMS error or validation finding. `Failure` ranks above `Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// The standard ebMS3 / AS4 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    ValueNotRecognized,
    FeatureNotSupported,
    ValueInconsistent,
    Other,
    ConnectionFailure,
    EmptyMessagePartitionChannel,
    MimeInconsistency,
    InvalidHeader,
    ProcessingModeMismatch,
    ExternalPayloadError,
    FailedAuthentication,
    FailedDecryption,
    PolicyNoncompliance,
    DysfunctionalReliability,
    DeliveryFailure,
    MissingReceipt,
    InvalidReceipt,
    DecompressionFailure,
}

impl ErrorCode {
    /// The code as written in the ebMS header, e.g. `EBMS:0009`
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValueNotRecognized => "EBMS:0001",
            Self::FeatureNotSupported => "EBMS:0002",
            Self::ValueInconsistent => "EBMS:0003",
            Self::Other => "EBMS:0004",
            Self::ConnectionFailure => "EBMS:0005",
            Self::EmptyMessagePartitionChannel => "EBMS:0006",
            Self::MimeInconsistency => "EBMS:0007",
            Self::InvalidHeader => "EBMS:0009",
            Self::ProcessingModeMismatch => "EBMS:0010",
            Self::ExternalPayloadError => "EBMS:0011",
            Self::FailedAuthentication => "EBMS:0101",
            Self::FailedDecryption => "EBMS:0102",
            Self::PolicyNoncompliance => "EBMS:0103",
            Self::DysfunctionalReliability => "EBMS:0201",
            Self::DeliveryFailure => "EBMS:0202",
            Self::MissingReceipt => "EBMS:0301",
            Self::InvalidReceipt => "EBMS:0302",
            Self::DecompressionFailure => "EBMS:0303",
        }
    }

    pub fn short_description(&self) -> &'static str {
        match self {
            Self::ValueNotRecognized => "ValueNotRecognized",
            Self::FeatureNotSupported => "FeatureNotSupported",
            Self::ValueInconsistent => "ValueInconsistent",
            Self::Other => "Other",
            Self::ConnectionFailure => "ConnectionFailure",
            Self::EmptyMessagePartitionChannel => "EmptyMessagePartitionChannel",
            Self::MimeInconsistency => "MimeInconsistency",
            Self::InvalidHeader => "InvalidHeader",
            Self::ProcessingModeMismatch => "ProcessingModeMismatch",
            Self::ExternalPayloadError => "ExternalPayloadError",
            Self::FailedAuthentication => "FailedAuthentication",
            Self::FailedDecryption => "FailedDecryption",
            Self::PolicyNoncompliance => "PolicyNoncompliance",
            Self::DysfunctionalReliability => "DysfunctionalReliability",
            Self::DeliveryFailure => "DeliveryFailure",
            Self::MissingReceipt => "MissingReceipt",
            Self::InvalidReceipt => "InvalidReceipt",
            Self::DecompressionFailure => "DecompressionFailure",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::ValueNotRecognized
            | Self::FeatureNotSupported
            | Self::ValueInconsistent
            | Self::Other
            | Self::ExternalPayloadError
            | Self::DecompressionFailure => "Content",
            Self::ConnectionFailure
            | Self::EmptyMessagePartitionChannel
            | Self::DeliveryFailure
            | Self::MissingReceipt
            | Self::InvalidReceipt => "Communication",
            Self::MimeInconsistency | Self::InvalidHeader => "Unpackaging",
            Self::ProcessingModeMismatch
            | Self::FailedAuthentication
            | Self::FailedDecryption
            | Self::PolicyNoncompliance
            | Self::DysfunctionalReliability => "Processing",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::FeatureNotSupported | Self::EmptyMessagePartitionChannel => Severity::Warning,
            _ => Severity::Failure,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.short_description())
    }
}

/// An ebMS error, the payload of an Error signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbmsError {
    pub error_code: ErrorCode,
    pub severity: Severity,
    pub ref_to_message_in_error: Option<String>,
    pub detail: Option<String>,
    pub origin: Option<String>,
}

impl EbmsError {
    /// Create an error with the code's default severity
    pub fn new(error_code: ErrorCode, ref_to_message_in_error: Option<String>) -> Self {
        Self {
            error_code,
            severity: error_code.default_severity(),
            ref_to_message_in_error,
            detail: None,
            origin: Some("ebMS".to_string()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn invalid_header(detail: impl Into<String>, ref_to: Option<&str>) -> Self {
        Self::new(ErrorCode::InvalidHeader, ref_to.map(str::to_string)).with_detail(detail)
    }

    pub fn value_inconsistent(detail: impl Into<String>, ref_to: Option<&str>) -> Self {
        Self::new(ErrorCode::ValueInconsistent, ref_to.map(str::to_string)).with_detail(detail)
    }

    /// The generic "Other" error in the Content category, used for internal failures
    pub fn other_content_error(detail: impl Into<String>, ref_to: Option<&str>) -> Self {
        Self::new(ErrorCode::Other, ref_to.map(str::to_string)).with_detail(detail)
    }
}

impl fmt::Display for EbmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.error_code, self.severity)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Failure > Severity::Warning);
        assert_eq!(
            [Severity::Warning, Severity::Failure, Severity::Warning]
                .into_iter()
                .max(),
            Some(Severity::Failure)
        );
    }

    #[test]
    fn test_error_code_table() {
        assert_eq!(ErrorCode::InvalidHeader.code(), "EBMS:0009");
        assert_eq!(ErrorCode::InvalidHeader.category(), "Unpackaging");
        assert_eq!(ErrorCode::MissingReceipt.code(), "EBMS:0301");
        assert_eq!(
            ErrorCode::EmptyMessagePartitionChannel.default_severity(),
            Severity::Warning
        );
    }

    #[test]
    fn test_builders() {
        let err = EbmsError::value_inconsistent("service mismatch", Some("msg-1@example.com"))
            .with_severity(Severity::Warning);
        assert_eq!(err.error_code, ErrorCode::ValueInconsistent);
        assert_eq!(err.severity, Severity::Warning);
        assert_eq!(err.ref_to_message_in_error.as_deref(), Some("msg-1@example.com"));
        assert_eq!(
            err.to_string(),
            "EBMS:0003 (ValueInconsistent) [warning]: service mismatch"
        );
    }
}
