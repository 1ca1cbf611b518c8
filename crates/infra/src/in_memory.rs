use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use contentgate_auth::{ConditionRecord, HierarchyEdge, PermissionSource, SourceError};
use contentgate_core::{Action, Resource, Role};

type RuleKey = (Role, Resource, Action);

#[derive(Debug, Default)]
struct Tables {
    edges: Vec<HierarchyEdge>,
    snapshots: HashMap<Role, JsonValue>,
    conditions: HashMap<RuleKey, ConditionRecord>,
}

/// In-memory permission source.
///
/// Intended for tests/dev and for running without a database. Rows can be
/// replaced at runtime; callers are responsible for invalidating the
/// snapshot cache afterwards.
#[derive(Debug, Default)]
pub struct InMemoryPermissionSource {
    tables: RwLock<Tables>,
}

impl InMemoryPermissionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(self, child: impl Into<Role>, parent: impl Into<Role>) -> Self {
        self.add_edge(HierarchyEdge::new(child, parent));
        self
    }

    pub fn with_snapshot(self, role: impl Into<Role>, permissions: JsonValue) -> Self {
        self.put_snapshot(role, permissions);
        self
    }

    pub fn with_condition(
        self,
        role: impl Into<Role>,
        resource: impl Into<Resource>,
        action: Action,
        record: ConditionRecord,
    ) -> Self {
        self.put_condition(role, resource, action, record);
        self
    }

    pub fn add_edge(&self, edge: HierarchyEdge) {
        if let Ok(mut t) = self.tables.write() {
            t.edges.push(edge);
        }
    }

    pub fn put_snapshot(&self, role: impl Into<Role>, permissions: JsonValue) {
        if let Ok(mut t) = self.tables.write() {
            t.snapshots.insert(role.into(), permissions);
        }
    }

    pub fn remove_snapshot(&self, role: &Role) {
        if let Ok(mut t) = self.tables.write() {
            t.snapshots.remove(role);
        }
    }

    pub fn put_condition(
        &self,
        role: impl Into<Role>,
        resource: impl Into<Resource>,
        action: Action,
        record: ConditionRecord,
    ) {
        if let Ok(mut t) = self.tables.write() {
            t.conditions.insert((role.into(), resource.into(), action), record);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, SourceError> {
        self.tables
            .read()
            .map_err(|_| SourceError::Unavailable("in-memory tables poisoned".into()))
    }
}

#[async_trait]
impl PermissionSource for InMemoryPermissionSource {
    async fn list_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, SourceError> {
        Ok(self.read()?.edges.clone())
    }

    async fn permission_snapshot(&self, role: &Role) -> Result<Option<JsonValue>, SourceError> {
        Ok(self.read()?.snapshots.get(role).cloned())
    }

    async fn condition_for_rule(
        &self,
        role: &Role,
        resource: &Resource,
        action: Action,
    ) -> Result<Option<ConditionRecord>, SourceError> {
        Ok(self
            .read()?
            .conditions
            .get(&(role.clone(), resource.clone(), action))
            .cloned())
    }
}
