use super::validators::{
    ErrorSignalValidator, MessageIdShapeValidator, PullRequestValidator, ReceiptValidator,
    StrictErrorSignalValidator, StrictPullRequestValidator, StrictUserMessageValidator,
    UserMessageValidator,
};
use super::{HeaderValidator, ValidationFailure, ValidationMode, ValidatorError};
use crate::config::DEFAULT_VALIDATOR_SET;
use crate::models::{MessageUnit, MessageUnitType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The validators to run per message unit type. Strict mode runs the lax validators followed
/// by the strict-only ones.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    lax: HashMap<MessageUnitType, Vec<Arc<dyn HeaderValidator>>>,
    strict_only: HashMap<MessageUnitType, Vec<Arc<dyn HeaderValidator>>>,
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |m: &HashMap<MessageUnitType, Vec<Arc<dyn HeaderValidator>>>| {
            m.iter()
                .map(|(t, v)| (*t, v.iter().map(|x| x.name().to_string()).collect::<Vec<_>>()))
                .collect::<HashMap<_, _>>()
        };
        f.debug_struct("ValidatorSet")
            .field("lax", &names(&self.lax))
            .field("strict_only", &names(&self.strict_only))
            .finish()
    }
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in validators for all message unit types
    pub fn builtin() -> Self {
        Self::new()
            .with_lax(MessageUnitType::UserMessage, UserMessageValidator)
            .with_strict(MessageUnitType::UserMessage, StrictUserMessageValidator)
            .with_lax(MessageUnitType::Receipt, ReceiptValidator)
            .with_strict(MessageUnitType::Receipt, MessageIdShapeValidator)
            .with_lax(MessageUnitType::ErrorMessage, ErrorSignalValidator)
            .with_strict(MessageUnitType::ErrorMessage, StrictErrorSignalValidator)
            .with_lax(MessageUnitType::PullRequest, PullRequestValidator)
            .with_strict(MessageUnitType::PullRequest, StrictPullRequestValidator)
    }

    /// Add a validator used in both modes
    pub fn with_lax(
        mut self,
        unit_type: MessageUnitType,
        validator: impl HeaderValidator + 'static,
    ) -> Self {
        self.lax
            .entry(unit_type)
            .or_default()
            .push(Arc::new(validator));
        self
    }

    /// Add a validator used in strict mode only
    pub fn with_strict(
        mut self,
        unit_type: MessageUnitType,
        validator: impl HeaderValidator + 'static,
    ) -> Self {
        self.strict_only
            .entry(unit_type)
            .or_default()
            .push(Arc::new(validator));
        self
    }

    pub fn validators_for(
        &self,
        unit_type: MessageUnitType,
        mode: ValidationMode,
    ) -> Vec<Arc<dyn HeaderValidator>> {
        let mut validators = self.lax.get(&unit_type).cloned().unwrap_or_default();
        if mode == ValidationMode::Strict {
            validators.extend(self.strict_only.get(&unit_type).cloned().unwrap_or_default());
        }
        validators
    }

    /// Run all applicable validators, collecting every failure in validator order.
    /// Stops at the first validator that cannot do its work.
    pub fn validate(
        &self,
        unit: &MessageUnit,
        mode: ValidationMode,
    ) -> Result<Vec<ValidationFailure>, ValidatorError> {
        let mut failures = Vec::new();
        for validator in self.validators_for(unit.unit_type(), mode) {
            failures.extend(validator.validate(unit)?);
        }
        Ok(failures)
    }
}

/// Validator sets available to the header validation stage, by identifier
#[derive(Debug)]
pub struct ValidatorSetRegistry {
    sets: RwLock<HashMap<String, Arc<ValidatorSet>>>,
}

impl Default for ValidatorSetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorSetRegistry {
    /// Registry with the built-in set registered as `default`
    pub fn new() -> Self {
        let registry = Self {
            sets: RwLock::new(HashMap::new()),
        };
        registry.register(DEFAULT_VALIDATOR_SET, ValidatorSet::builtin());
        registry
    }

    pub fn register(&self, identifier: impl Into<String>, set: ValidatorSet) {
        self.sets.write().insert(identifier.into(), Arc::new(set));
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<ValidatorSet>> {
        self.sets.read().get(identifier).cloned()
    }
}
