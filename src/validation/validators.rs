//! Built-in header validators.

use super::{HeaderValidator, ValidationFailure, ValidatorError};
use crate::models::{MessageUnit, MessageUnitContent, PartyId, TradingPartner};
use std::collections::HashSet;

/// `scheme:rest` where the scheme starts with a letter and the rest has no whitespace
pub fn is_uri(value: &str) -> bool {
    let Some((scheme, rest)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_with_letter
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
        && !rest.chars().any(char::is_whitespace)
}

/// Message ids must look like `local@domain`
pub fn is_message_id_shaped(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>'))
}

fn check_message_id(unit: &MessageUnit, failures: &mut Vec<ValidationFailure>) {
    if unit.message_id.trim().is_empty() {
        failures.push(ValidationFailure::failure("MessageId is missing"));
    }
    if let Some(ref_to) = &unit.ref_to_message_id {
        if ref_to.trim().is_empty() {
            failures.push(ValidationFailure::failure("RefToMessageId is empty"));
        }
    }
}

fn check_message_id_shape(unit: &MessageUnit, failures: &mut Vec<ValidationFailure>) {
    if !unit.message_id.is_empty() && !is_message_id_shaped(&unit.message_id) {
        failures.push(ValidationFailure::failure(format!(
            "MessageId [{}] is not of the form local@domain",
            unit.message_id
        )));
    }
}

fn check_partner(role: &str, partner: &TradingPartner, failures: &mut Vec<ValidationFailure>) {
    if partner.party_ids.is_empty() {
        failures.push(ValidationFailure::failure(format!("{role} has no PartyId")));
    }
    if partner.party_ids.iter().any(|p| p.id.trim().is_empty()) {
        failures.push(ValidationFailure::failure(format!("{role} has an empty PartyId")));
    }
    if partner.role.trim().is_empty() {
        failures.push(ValidationFailure::failure(format!("{role} Role is missing")));
    }
}

fn check_untyped_party_ids(role: &str, ids: &[PartyId], failures: &mut Vec<ValidationFailure>) {
    for party in ids.iter().filter(|p| p.party_type.is_none()) {
        if !party.id.is_empty() && !is_uri(&party.id) {
            failures.push(
                ValidationFailure::failure(format!(
                    "{role} PartyId [{}] has no type and is not a URI",
                    party.id
                ))
                .inconsistent(),
            );
        }
    }
}

fn wrong_type(validator: &str, unit: &MessageUnit) -> ValidatorError {
    ValidatorError::internal(
        validator,
        format!("cannot validate a {}", unit.unit_type()),
    )
}

/// Required User Message meta-data
#[derive(Debug, Default)]
pub struct UserMessageValidator;

impl HeaderValidator for UserMessageValidator {
    fn name(&self) -> &str {
        "UserMessageValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let Some(um) = unit.as_user_message() else {
            return Err(wrong_type(self.name(), unit));
        };
        let mut failures = Vec::new();
        check_message_id(unit, &mut failures);
        check_partner("Sender", &um.sender, &mut failures);
        check_partner("Receiver", &um.receiver, &mut failures);

        if um.collaboration.service.name.trim().is_empty() {
            failures.push(ValidationFailure::failure("Service is missing"));
        }
        if um.collaboration.action.trim().is_empty() {
            failures.push(ValidationFailure::failure("Action is missing"));
        }

        let mut seen = HashSet::new();
        for payload in &um.payloads {
            if !seen.insert(payload.content_id.as_str()) {
                failures.push(ValidationFailure::failure(format!(
                    "Payload reference [{}] is used more than once",
                    payload.content_id
                )));
            }
        }
        Ok(failures)
    }
}

/// Additional User Message checks in strict mode
#[derive(Debug, Default)]
pub struct StrictUserMessageValidator;

impl HeaderValidator for StrictUserMessageValidator {
    fn name(&self) -> &str {
        "StrictUserMessageValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let Some(um) = unit.as_user_message() else {
            return Err(wrong_type(self.name(), unit));
        };
        let mut failures = Vec::new();
        check_message_id_shape(unit, &mut failures);

        let service = &um.collaboration.service;
        if service.service_type.is_none() && !service.name.is_empty() && !is_uri(&service.name) {
            failures.push(
                ValidationFailure::failure(format!(
                    "Service [{}] has no type and is not a URI",
                    service.name
                ))
                .inconsistent(),
            );
        }
        check_untyped_party_ids("Sender", &um.sender.party_ids, &mut failures);
        check_untyped_party_ids("Receiver", &um.receiver.party_ids, &mut failures);

        if um
            .collaboration
            .conversation_id
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
        {
            failures.push(ValidationFailure::failure("ConversationId is missing"));
        }
        Ok(failures)
    }
}

#[derive(Debug, Default)]
pub struct ReceiptValidator;

impl HeaderValidator for ReceiptValidator {
    fn name(&self) -> &str {
        "ReceiptValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let MessageUnitContent::Receipt(receipt) = &unit.content else {
            return Err(wrong_type(self.name(), unit));
        };
        let mut failures = Vec::new();
        check_message_id(unit, &mut failures);
        if unit.ref_to_message_id.is_none() {
            failures.push(ValidationFailure::failure("Receipt does not reference a message"));
        }
        if receipt.content.is_empty() {
            failures.push(ValidationFailure::failure("Receipt has no content"));
        }
        Ok(failures)
    }
}

/// Message id shape check shared by the strict signal validators
#[derive(Debug, Default)]
pub struct MessageIdShapeValidator;

impl HeaderValidator for MessageIdShapeValidator {
    fn name(&self) -> &str {
        "MessageIdShapeValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let mut failures = Vec::new();
        check_message_id_shape(unit, &mut failures);
        Ok(failures)
    }
}

#[derive(Debug, Default)]
pub struct ErrorSignalValidator;

impl HeaderValidator for ErrorSignalValidator {
    fn name(&self) -> &str {
        "ErrorSignalValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let Some(signal) = unit.as_error_message() else {
            return Err(wrong_type(self.name(), unit));
        };
        let mut failures = Vec::new();
        check_message_id(unit, &mut failures);
        if signal.errors.is_empty() {
            failures.push(ValidationFailure::failure("Error signal contains no errors"));
        }
        Ok(failures)
    }
}

/// In strict mode all errors in a signal must refer to the message the signal refers to
#[derive(Debug, Default)]
pub struct StrictErrorSignalValidator;

impl HeaderValidator for StrictErrorSignalValidator {
    fn name(&self) -> &str {
        "StrictErrorSignalValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let Some(signal) = unit.as_error_message() else {
            return Err(wrong_type(self.name(), unit));
        };
        let mut failures = Vec::new();
        check_message_id_shape(unit, &mut failures);
        let signal_ref = unit.ref_to_message_id.as_deref();
        for error in &signal.errors {
            let error_ref = error.ref_to_message_in_error.as_deref();
            if error_ref.is_some() && error_ref != signal_ref {
                failures.push(
                    ValidationFailure::failure(format!(
                        "Error {} refers to [{}] instead of the message referenced by the signal",
                        error.error_code.code(),
                        error_ref.unwrap_or_default()
                    ))
                    .inconsistent(),
                );
            }
        }
        Ok(failures)
    }
}

#[derive(Debug, Default)]
pub struct PullRequestValidator;

impl HeaderValidator for PullRequestValidator {
    fn name(&self) -> &str {
        "PullRequestValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        if !matches!(unit.content, MessageUnitContent::PullRequest(_)) {
            return Err(wrong_type(self.name(), unit));
        }
        let mut failures = Vec::new();
        check_message_id(unit, &mut failures);
        Ok(failures)
    }
}

#[derive(Debug, Default)]
pub struct StrictPullRequestValidator;

impl HeaderValidator for StrictPullRequestValidator {
    fn name(&self) -> &str {
        "StrictPullRequestValidator"
    }

    fn validate(&self, unit: &MessageUnit) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let MessageUnitContent::PullRequest(pr) = &unit.content else {
            return Err(wrong_type(self.name(), unit));
        };
        let mut failures = Vec::new();
        check_message_id_shape(unit, &mut failures);
        if !is_uri(&pr.mpc) {
            failures.push(ValidationFailure::failure(format!(
                "MPC [{}] is not a URI",
                pr.mpc
            )));
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CollaborationInfo, Containment, Direction, EbmsError, ErrorCode, ErrorMessage,
        PayloadInfo, Service, UserMessage,
    };

    fn valid_user_message() -> UserMessage {
        UserMessage {
            mpc: None,
            sender: TradingPartner {
                party_ids: vec![PartyId::new("urn:org:sender")],
                role: "Sender".into(),
            },
            receiver: TradingPartner {
                party_ids: vec![PartyId::typed("receiver", "urn:party:type")],
                role: "Receiver".into(),
            },
            collaboration: CollaborationInfo {
                service: Service {
                    name: "urn:services:invoice".into(),
                    service_type: None,
                },
                action: "Deliver".into(),
                conversation_id: Some("conv-1".into()),
                agreement_ref: None,
            },
            payloads: vec![PayloadInfo {
                content_id: "cid:p1@example.com".into(),
                containment: Containment::Attachment,
                content_location: Some("/tmp/p1".into()),
                mime_type: Some("application/xml".into()),
            }],
        }
    }

    #[test]
    fn test_uri_and_message_id_shapes() {
        assert!(is_uri("urn:oasis:names:tc:ebcore"));
        assert!(is_uri("http://example.com/mpc"));
        assert!(!is_uri("not a uri"));
        assert!(!is_uri("1abc:rest"));
        assert!(!is_uri("scheme:"));

        assert!(is_message_id_shaped("abc@example.com"));
        assert!(!is_message_id_shaped("abc"));
        assert!(!is_message_id_shaped("@example.com"));
        assert!(!is_message_id_shaped("a@b@c"));
        assert!(!is_message_id_shaped("<a@b>"));
    }

    #[test]
    fn test_valid_user_message_passes_both_modes() {
        let unit = MessageUnit::user_message(Direction::In, "m1@example.com", valid_user_message());
        assert!(UserMessageValidator.validate(&unit).unwrap().is_empty());
        assert!(StrictUserMessageValidator.validate(&unit).unwrap().is_empty());
    }

    #[test]
    fn test_lax_user_message_failures() {
        let mut um = valid_user_message();
        um.collaboration.action.clear();
        um.sender.role.clear();
        um.payloads.push(um.payloads[0].clone());
        let unit = MessageUnit::user_message(Direction::In, "m1@example.com", um);

        let failures = UserMessageValidator.validate(&unit).unwrap();
        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|f| !f.value_inconsistent));
    }

    #[test]
    fn test_strict_marks_untyped_service_inconsistent() {
        let mut um = valid_user_message();
        um.collaboration.service.name = "invoicing".into();
        let unit = MessageUnit::user_message(Direction::In, "m1@example.com", um);

        let failures = StrictUserMessageValidator.validate(&unit).unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].value_inconsistent);
    }

    #[test]
    fn test_wrong_unit_type_is_a_validator_error() {
        let unit = MessageUnit::pull_request(Direction::In, "pr@example.com", "urn:mpc");
        assert!(UserMessageValidator.validate(&unit).is_err());
    }

    #[test]
    fn test_strict_error_signal_references() {
        let signal = ErrorMessage {
            errors: vec![
                EbmsError::new(ErrorCode::DeliveryFailure, Some("m1@example.com".into())),
                EbmsError::new(ErrorCode::Other, Some("m2@example.com".into())),
            ],
        };
        let unit = MessageUnit::error_message(Direction::In, "e1@example.com", signal)
            .with_ref_to("m1@example.com");

        assert!(ErrorSignalValidator.validate(&unit).unwrap().is_empty());
        let failures = StrictErrorSignalValidator.validate(&unit).unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].value_inconsistent);
    }
}
