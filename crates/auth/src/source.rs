//! Read-only persistence collaborator consumed by the engine.
//!
//! The engine never writes through this trait. Implementations live in
//! `contentgate-infra` (in-memory and Postgres).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use contentgate_core::{Action, GateError, Resource, Role};

/// Declared inheritance relationship: `child` inherits `parent`'s grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub child: Role,
    pub parent: Role,
}

impl HierarchyEdge {
    pub fn new(child: impl Into<Role>, parent: impl Into<Role>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }
}

/// Condition attached to a permission rule.
///
/// `sql` is the legacy string template; `predicate`, when present, is the
/// structured form (see [`crate::condition::Predicate`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionRecord {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub predicate: Option<JsonValue>,
}

impl ConditionRecord {
    pub fn legacy(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            predicate: None,
        }
    }

    pub fn structured(predicate: JsonValue) -> Self {
        Self {
            sql: String::new(),
            predicate: Some(predicate),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("permission source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed row: {0}")]
    Malformed(String),
}

impl From<SourceError> for GateError {
    fn from(value: SourceError) -> Self {
        GateError::data(value.to_string())
    }
}

/// Persistence collaborator (role/permission rows).
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// All `(child, parent)` edges. An empty list is not an error.
    async fn list_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, SourceError>;

    /// Raw snapshot object for a role (`resource -> action map`), if any.
    async fn permission_snapshot(&self, role: &Role) -> Result<Option<JsonValue>, SourceError>;

    /// Condition for a single rule, if the rule carries one.
    async fn condition_for_rule(
        &self,
        role: &Role,
        resource: &Resource,
        action: Action,
    ) -> Result<Option<ConditionRecord>, SourceError>;
}

#[async_trait]
impl<S> PermissionSource for Arc<S>
where
    S: PermissionSource + ?Sized,
{
    async fn list_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, SourceError> {
        (**self).list_hierarchy_edges().await
    }

    async fn permission_snapshot(&self, role: &Role) -> Result<Option<JsonValue>, SourceError> {
        (**self).permission_snapshot(role).await
    }

    async fn condition_for_rule(
        &self,
        role: &Role,
        resource: &Resource,
        action: Action,
    ) -> Result<Option<ConditionRecord>, SourceError> {
        (**self).condition_for_rule(role, resource, action).await
    }
}
