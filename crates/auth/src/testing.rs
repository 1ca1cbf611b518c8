//! Test doubles for the engine's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use contentgate_core::{Action, GateError, GateResult, Resource, Role};

use crate::identity::{IdentityProvider, VerifiedSubject};
use crate::source::{ConditionRecord, HierarchyEdge, PermissionSource, SourceError};

#[derive(Default)]
pub struct FakeProvider {
    subjects: HashMap<String, VerifiedSubject>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: &str, id: &str, role: &str) -> Self {
        let claims = json!({ "role": role, "email": format!("{id}@example.com") });
        self.with_subject(
            token,
            VerifiedSubject {
                subject_id: Some(id.to_string()),
                claims: claims.as_object().cloned().unwrap_or_default(),
            },
        )
    }

    pub fn with_subject(mut self, token: &str, subject: VerifiedSubject) -> Self {
        self.subjects.insert(token.to_string(), subject);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn verify_credential(&self, token: &str) -> GateResult<VerifiedSubject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.subjects
            .get(token)
            .cloned()
            .ok_or_else(|| GateError::authentication("rejected by provider"))
    }
}

#[derive(Default)]
pub struct FakeSource {
    edges: Vec<HierarchyEdge>,
    snapshots: RwLock<HashMap<Role, JsonValue>>,
    conditions: HashMap<(Role, Resource, Action), ConditionRecord>,
    failing_roles: Vec<Role>,
    failing_condition_roles: Vec<Role>,
    delay: Option<Duration>,
    condition_delay: Option<Duration>,
    snapshot_fetches: AtomicUsize,
    edge_scans: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, child: &'static str, parent: &'static str) -> Self {
        self.edges.push(HierarchyEdge::new(child, parent));
        self
    }

    pub fn with_snapshot(self, role: &'static str, snapshot: JsonValue) -> Self {
        self.set_snapshot(role, snapshot);
        self
    }

    pub fn with_condition(
        mut self,
        role: &'static str,
        resource: &'static str,
        action: Action,
        record: ConditionRecord,
    ) -> Self {
        self.conditions
            .insert((Role::from(role), Resource::from(resource), action), record);
        self
    }

    pub fn with_failing_role(mut self, role: &'static str) -> Self {
        self.failing_roles.push(Role::from(role));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Condition lookups for `role` fail.
    pub fn with_failing_condition(mut self, role: &'static str) -> Self {
        self.failing_condition_roles.push(Role::from(role));
        self
    }

    pub fn with_condition_delay(mut self, delay: Duration) -> Self {
        self.condition_delay = Some(delay);
        self
    }

    pub fn set_snapshot(&self, role: &'static str, snapshot: JsonValue) {
        if let Ok(mut map) = self.snapshots.write() {
            map.insert(Role::from(role), snapshot);
        }
    }

    pub fn snapshot_fetches(&self) -> usize {
        self.snapshot_fetches.load(Ordering::SeqCst)
    }

    pub fn edge_scans(&self) -> usize {
        self.edge_scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionSource for FakeSource {
    async fn list_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, SourceError> {
        self.edge_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.edges.clone())
    }

    async fn permission_snapshot(&self, role: &Role) -> Result<Option<JsonValue>, SourceError> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_roles.contains(role) {
            return Err(SourceError::Unavailable("connection reset".into()));
        }
        let map = self
            .snapshots
            .read()
            .map_err(|_| SourceError::Unavailable("poisoned".into()))?;
        Ok(map.get(role).cloned())
    }

    async fn condition_for_rule(
        &self,
        role: &Role,
        resource: &Resource,
        action: Action,
    ) -> Result<Option<ConditionRecord>, SourceError> {
        if let Some(delay) = self.condition_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_condition_roles.contains(role) {
            return Err(SourceError::Unavailable("connection reset".into()));
        }
        Ok(self
            .conditions
            .get(&(role.clone(), resource.clone(), action))
            .cloned())
    }
}
