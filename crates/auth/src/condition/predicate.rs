//! Structured row-level predicates.
//!
//! JSON form (externally tagged):
//!
//! ```json
//! { "and": [
//!     { "eq": { "field": "row:owner_id", "value": { "caller": "id" } } },
//!     { "not": { "eq": { "field": "claim:role", "value": { "literal": "suspended" } } } }
//! ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::identity::Identity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Eq { field: FieldRef, value: ValueRef },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

/// Left-hand side of a comparison: `claim:<name>` or `row:<column>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldRef {
    Claim(String),
    Row(String),
}

impl TryFrom<String> for FieldRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (kind, name) = value
            .split_once(':')
            .ok_or_else(|| format!("field '{value}' must be 'claim:<name>' or 'row:<column>'"))?;
        if name.trim().is_empty() {
            return Err(format!("field '{value}' has an empty name"));
        }
        match kind {
            "claim" => Ok(FieldRef::Claim(name.to_string())),
            "row" => Ok(FieldRef::Row(name.to_string())),
            other => Err(format!("unknown field kind '{other}'")),
        }
    }
}

impl From<FieldRef> for String {
    fn from(value: FieldRef) -> Self {
        match value {
            FieldRef::Claim(n) => format!("claim:{n}"),
            FieldRef::Row(n) => format!("row:{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRef {
    Literal(JsonValue),
    Caller(CallerAttribute),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerAttribute {
    Id,
    Role,
    Email,
    Audience,
}

impl CallerAttribute {
    fn resolve(&self, identity: &Identity) -> Option<JsonValue> {
        match self {
            CallerAttribute::Id => identity.claim("id"),
            CallerAttribute::Role => identity.claim("role"),
            CallerAttribute::Email => identity.claim("email"),
            CallerAttribute::Audience => identity.claim("aud"),
        }
    }
}

/// Result of evaluating a predicate without the row.
#[derive(Debug, Clone, PartialEq)]
pub enum Residual {
    True,
    False,
    /// A comparison touched a missing claim or caller attribute. `Not` keeps
    /// it unknown and the condition denies.
    Unknown,
    /// Row-dependent remainder; caller references are already resolved.
    Pending(Predicate),
}

impl Predicate {
    pub fn eq(field: FieldRef, value: ValueRef) -> Self {
        Predicate::Eq { field, value }
    }

    /// "Owner column equals the caller id."
    pub fn owned_by_caller(column: impl Into<String>) -> Self {
        Predicate::eq(FieldRef::Row(column.into()), ValueRef::Caller(CallerAttribute::Id))
    }

    pub fn references_row(&self) -> bool {
        match self {
            Predicate::Eq { field, .. } => matches!(field, FieldRef::Row(_)),
            Predicate::And(ps) | Predicate::Or(ps) => ps.iter().any(Predicate::references_row),
            Predicate::Not(p) => p.references_row(),
        }
    }

    /// Decide everything that depends only on the caller.
    ///
    /// A missing value on either side of a comparison is `Unknown`, never
    /// `False`. Only a decided `False` (in `And`) or `True` (in `Or`) absorbs an
    /// unknown operand; anything else stays unknown, even next to a pending
    /// row term.
    pub fn partially_evaluate(&self, identity: &Identity) -> Residual {
        match self {
            Predicate::Eq { field, value } => {
                let Some(rhs) = resolve_value(value, identity) else {
                    return Residual::Unknown;
                };
                match field {
                    FieldRef::Claim(name) => match identity.claim(name) {
                        Some(lhs) if lhs == rhs => Residual::True,
                        Some(_) => Residual::False,
                        None => Residual::Unknown,
                    },
                    FieldRef::Row(_) => Residual::Pending(Predicate::Eq {
                        field: field.clone(),
                        value: ValueRef::Literal(rhs),
                    }),
                }
            }
            Predicate::And(parts) => {
                let mut pending = Vec::new();
                let mut unknown = false;
                for part in parts {
                    match part.partially_evaluate(identity) {
                        Residual::False => return Residual::False,
                        Residual::True => {}
                        Residual::Unknown => unknown = true,
                        Residual::Pending(p) => pending.push(p),
                    }
                }
                if unknown {
                    return Residual::Unknown;
                }
                match pending.len() {
                    0 => Residual::True,
                    1 => Residual::Pending(pending.remove(0)),
                    _ => Residual::Pending(Predicate::And(pending)),
                }
            }
            Predicate::Or(parts) => {
                let mut pending = Vec::new();
                let mut unknown = false;
                for part in parts {
                    match part.partially_evaluate(identity) {
                        Residual::True => return Residual::True,
                        Residual::False => {}
                        Residual::Unknown => unknown = true,
                        Residual::Pending(p) => pending.push(p),
                    }
                }
                if unknown {
                    return Residual::Unknown;
                }
                match pending.len() {
                    0 => Residual::False,
                    1 => Residual::Pending(pending.remove(0)),
                    _ => Residual::Pending(Predicate::Or(pending)),
                }
            }
            Predicate::Not(inner) => match inner.partially_evaluate(identity) {
                Residual::True => Residual::False,
                Residual::False => Residual::True,
                Residual::Unknown => Residual::Unknown,
                Residual::Pending(p) => Residual::Pending(Predicate::Not(Box::new(p))),
            },
        }
    }

    /// Full evaluation against the caller and a row. Unknown denies.
    pub fn evaluate(&self, identity: &Identity, row: &Map<String, JsonValue>) -> bool {
        match self.partially_evaluate(identity) {
            Residual::True => true,
            Residual::False | Residual::Unknown => false,
            Residual::Pending(p) => evaluate_row(&p, row) == Some(true),
        }
    }
}

fn resolve_value(value: &ValueRef, identity: &Identity) -> Option<JsonValue> {
    match value {
        ValueRef::Literal(v) => Some(v.clone()),
        ValueRef::Caller(attr) => attr.resolve(identity),
    }
}

/// Three-valued evaluation of a residual (row-only) predicate. `None` means
/// unknown: a missing column, or a term still referring to the caller.
fn evaluate_row(predicate: &Predicate, row: &Map<String, JsonValue>) -> Option<bool> {
    match predicate {
        Predicate::Eq {
            field: FieldRef::Row(column),
            value: ValueRef::Literal(expected),
        } => row.get(column).map(|actual| actual == expected),
        Predicate::Eq { .. } => None,
        Predicate::And(ps) => {
            let mut unknown = false;
            for p in ps {
                match evaluate_row(p, row) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => unknown = true,
                }
            }
            if unknown { None } else { Some(true) }
        }
        Predicate::Or(ps) => {
            let mut unknown = false;
            for p in ps {
                match evaluate_row(p, row) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => unknown = true,
                }
            }
            if unknown { None } else { Some(false) }
        }
        Predicate::Not(p) => evaluate_row(p, row).map(|b| !b),
    }
}

/// Row-dependent remainder of a condition, attached to the request context
/// of a permitted request. Handlers must apply it to every row they touch.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    predicate: Predicate,
}

impl RowFilter {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Only a definite match admits; a missing column rejects.
    pub fn admits(&self, row: &Map<String, JsonValue>) -> bool {
        evaluate_row(&self.predicate, row) == Some(true)
    }
}
