//! Row-level conditions attached to permission rules.

pub mod legacy;
pub mod predicate;

use core::str::FromStr;

use tracing::warn;

use contentgate_core::{GateError, GateResult};

use crate::identity::Identity;
use crate::source::ConditionRecord;

pub use legacy::{evaluate_template, CALLER_PLACEHOLDER};
pub use predicate::{CallerAttribute, FieldRef, Predicate, Residual, RowFilter, ValueRef};

/// How conditions stored as legacy templates are treated.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ConditionMode {
    /// Templates go through the substring shim (current behavior).
    #[default]
    Legacy,
    /// Templates are refused; only structured predicates can pass.
    /// Breaking change for rules that still carry only a template.
    Structured,
}

impl FromStr for ConditionMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(ConditionMode::Legacy),
            "structured" => Ok(ConditionMode::Structured),
            other => Err(GateError::configuration(format!("unknown condition mode '{other}'"))),
        }
    }
}

/// Condition of one rule, in either form.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    Legacy(String),
    Structured(Predicate),
}

impl RuleCondition {
    /// Interpret a stored record. A record with neither a predicate nor a
    /// template carries no condition. An unparsable predicate is a data error.
    pub fn from_record(record: &ConditionRecord) -> GateResult<Option<Self>> {
        if let Some(raw) = &record.predicate {
            if !raw.is_null() {
                let predicate: Predicate = serde_json::from_value(raw.clone())
                    .map_err(|e| GateError::data(format!("malformed condition predicate: {e}")))?;
                return Ok(Some(RuleCondition::Structured(predicate)));
            }
        }
        if record.sql.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(RuleCondition::Legacy(record.sql.clone())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOutcome {
    Satisfied,
    Failed,
    /// Passes for the caller but depends on the row; enforce per row.
    Deferred(RowFilter),
}

#[derive(Debug, Copy, Clone, Default)]
pub struct ConditionEvaluator {
    mode: ConditionMode,
}

impl ConditionEvaluator {
    pub fn new(mode: ConditionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ConditionMode {
        self.mode
    }

    pub fn evaluate(&self, condition: &RuleCondition, identity: &Identity) -> ConditionOutcome {
        match condition {
            RuleCondition::Legacy(template) => match self.mode {
                ConditionMode::Legacy => {
                    if evaluate_template(template, identity.id.as_str()) {
                        ConditionOutcome::Satisfied
                    } else {
                        ConditionOutcome::Failed
                    }
                }
                ConditionMode::Structured => {
                    warn!("legacy condition template refused in structured mode");
                    ConditionOutcome::Failed
                }
            },
            RuleCondition::Structured(predicate) => match predicate.partially_evaluate(identity) {
                Residual::True => ConditionOutcome::Satisfied,
                Residual::False | Residual::Unknown => ConditionOutcome::Failed,
                Residual::Pending(rest) => ConditionOutcome::Deferred(RowFilter::new(rest)),
            },
        }
    }
}
