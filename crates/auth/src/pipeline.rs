//! Per-request authorization pipeline.
//!
//! `NoRequirement` | `Unauthenticated` -> `Authenticated` -> `Permitted` | `Denied`
//!
//! Each step awaits the previous one; there is no intra-request parallelism.
//! Dropping the returned future abandons any in-flight upstream call, which
//! is safe because the pipeline never writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use contentgate_core::{Action, ActionFlags, Resource, Role};

use crate::condition::{ConditionEvaluator, ConditionMode, ConditionOutcome, RowFilter, RuleCondition};
use crate::effective::{effective_permissions, granting_roles, InheritanceMode};
use crate::hierarchy::RoleHierarchyStore;
use crate::identity::{Identity, IdentityVerifier};
use crate::requirement::{resolve_requirement, EnforcementMode, RouteRequirement};
use crate::snapshot::SnapshotCache;
use crate::source::PermissionSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub inheritance: InheritanceMode,
    pub condition_mode: ConditionMode,
    pub enforcement: EnforcementMode,
    /// Prefix below which path-derived requirements are inferred.
    pub path_prefix: String,
    /// Upper bound on a condition lookup.
    pub condition_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            inheritance: InheritanceMode::default(),
            condition_mode: ConditionMode::default(),
            enforcement: EnforcementMode::default(),
            path_prefix: "/api/".to_string(),
            condition_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NoRequirement,
    Unauthenticated,
    Authenticated,
    Permitted,
    Denied,
}

/// Server-side reason for a denial. Never shown to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoCredential,
    InvalidCredential,
    InsufficientPermission,
    ConditionFailed,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoCredential => "no credential",
            DenyReason::InvalidCredential => "invalid credential",
            DenyReason::InsufficientPermission => "insufficient permission",
            DenyReason::ConditionFailed => "condition failed",
        }
    }
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a permitted request carries downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub identity: Identity,
    /// Role whose grant admitted the request (differs from the caller's own
    /// role only under hierarchy inheritance).
    pub granted_by: Role,
    pub row_filter: Option<RowFilter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoRequirement,
    Permitted(Box<Grant>),
    Denied(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Denied(_))
    }

    pub fn state(&self) -> PipelineState {
        match self {
            Decision::NoRequirement => PipelineState::NoRequirement,
            Decision::Permitted(_) => PipelineState::Permitted,
            Decision::Denied(_) => PipelineState::Denied,
        }
    }

    pub fn grant(&self) -> Option<&Grant> {
        match self {
            Decision::Permitted(g) => Some(g.as_ref()),
            _ => None,
        }
    }
}

/// Inputs of one decision, extracted from the request by the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    /// Tag of the matched handler, if any.
    pub requirement: Option<&'a RouteRequirement>,
    pub method: &'a str,
    pub path: &'a str,
    /// Bearer credential, already stripped of its scheme.
    pub credential: Option<&'a str>,
}

pub struct AuthorizationPipeline {
    verifier: IdentityVerifier,
    snapshots: Arc<SnapshotCache>,
    hierarchy: Arc<RoleHierarchyStore>,
    source: Arc<dyn PermissionSource>,
    conditions: ConditionEvaluator,
    settings: PipelineSettings,
}

impl AuthorizationPipeline {
    pub fn new(
        verifier: IdentityVerifier,
        snapshots: Arc<SnapshotCache>,
        hierarchy: Arc<RoleHierarchyStore>,
        source: Arc<dyn PermissionSource>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            verifier,
            snapshots,
            hierarchy,
            source,
            conditions: ConditionEvaluator::new(settings.condition_mode),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCache> {
        &self.snapshots
    }

    pub fn hierarchy(&self) -> &Arc<RoleHierarchyStore> {
        &self.hierarchy
    }

    /// Decide one request. Every failure resolves to a denial.
    pub async fn authorize(&self, request: AuthorizationRequest<'_>) -> Decision {
        // 1. requirement
        let Some(requirement) = resolve_requirement(
            self.settings.enforcement,
            request.requirement,
            request.method,
            request.path,
            &self.settings.path_prefix,
        ) else {
            debug!(state = ?PipelineState::NoRequirement, "no requirement; allowing");
            return Decision::NoRequirement;
        };
        debug!(state = ?PipelineState::Unauthenticated, %requirement, "authorizing");

        // 2. credential
        let Some(credential) = request.credential else {
            return deny(&requirement, DenyReason::NoCredential);
        };

        // 3. identity
        let identity = match self.verifier.verify(credential).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(%requirement, error = %e, "credential verification failed");
                return deny(&requirement, DenyReason::InvalidCredential);
            }
        };
        debug!(state = ?PipelineState::Authenticated, caller = %identity.id, role = %identity.role, "caller verified");

        // 4. snapshot
        let granting = self.granting_roles(&identity.role, &requirement).await;
        if granting.is_empty() {
            return deny(&requirement, DenyReason::InsufficientPermission);
        }

        // 5. conditions
        match self.check_conditions(&identity, &requirement, &granting).await {
            Some((granted_by, row_filter)) => {
                debug!(
                    state = ?PipelineState::Permitted,
                    %requirement,
                    caller = %identity.id,
                    granted_by = %granted_by,
                    row_scoped = row_filter.is_some(),
                    "request permitted"
                );
                // 6. attach
                Decision::Permitted(Box::new(Grant {
                    identity,
                    granted_by,
                    row_filter,
                }))
            }
            None => deny(&requirement, DenyReason::ConditionFailed),
        }
    }

    async fn granting_roles(&self, role: &Role, requirement: &RouteRequirement) -> Vec<Role> {
        let resource = requirement.resource();
        let action = requirement.action();

        match self.settings.inheritance {
            InheritanceMode::SnapshotOnly => {
                let allowed = self
                    .snapshots
                    .permissions_for(role, resource)
                    .await
                    .is_some_and(|f| f.allows(action));
                if allowed { vec![role.clone()] } else { Vec::new() }
            }
            InheritanceMode::Hierarchy => {
                let ancestors = self.hierarchy.ancestors_of(role);
                let mut flags: HashMap<Role, ActionFlags> = HashMap::new();
                for r in std::iter::once(role).chain(ancestors.iter()) {
                    if let Some(f) = self.snapshots.permissions_for(r, resource).await {
                        flags.insert(r.clone(), f);
                    }
                }
                let lookup = |r: &Role| flags.get(r).copied();
                // The union decides; attribution only names who granted it.
                let effective = effective_permissions(role, &ancestors, lookup);
                if !effective.is_some_and(|f| f.allows(action)) {
                    return Vec::new();
                }
                granting_roles(role, &ancestors, action, lookup)
            }
        }
    }

    /// First granting role whose condition passes, with any row residual.
    /// An unconditional grant beats a row-scoped one.
    async fn check_conditions(
        &self,
        identity: &Identity,
        requirement: &RouteRequirement,
        granting: &[Role],
    ) -> Option<(Role, Option<RowFilter>)> {
        let mut scoped: Option<(Role, RowFilter)> = None;

        for role in granting {
            let condition = match self
                .condition_for(role, requirement.resource(), requirement.action())
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(%role, %requirement, error = %e, "condition lookup failed; grant ignored");
                    continue;
                }
            };
            let Some(condition) = condition else {
                return Some((role.clone(), None));
            };

            match self.conditions.evaluate(&condition, identity) {
                ConditionOutcome::Satisfied => return Some((role.clone(), None)),
                ConditionOutcome::Deferred(filter) => {
                    if scoped.is_none() {
                        scoped = Some((role.clone(), filter));
                    }
                }
                ConditionOutcome::Failed => {
                    debug!(%role, %requirement, "condition not met");
                }
            }
        }

        scoped.map(|(role, filter)| (role, Some(filter)))
    }

    async fn condition_for(
        &self,
        role: &Role,
        resource: &Resource,
        action: Action,
    ) -> contentgate_core::GateResult<Option<RuleCondition>> {
        let record = tokio::time::timeout(
            self.settings.condition_timeout,
            self.source.condition_for_rule(role, resource, action),
        )
        .await
        .map_err(|_| contentgate_core::GateError::data("condition lookup timed out"))??;

        match record {
            Some(r) => RuleCondition::from_record(&r),
            None => Ok(None),
        }
    }
}

fn deny(requirement: &RouteRequirement, reason: DenyReason) -> Decision {
    debug!(state = ?PipelineState::Denied, %requirement, %reason, "request denied");
    Decision::Denied(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyMap;
    use crate::snapshot::SnapshotCacheConfig;
    use crate::source::{ConditionRecord, HierarchyEdge};
    use crate::testing::{FakeProvider, FakeSource};
    use serde_json::{json, Map};

    struct Harness {
        pipeline: AuthorizationPipeline,
        provider: Arc<FakeProvider>,
    }

    fn harness(source: FakeSource, provider: FakeProvider, settings: PipelineSettings) -> Harness {
        let source = Arc::new(source);
        let provider = Arc::new(provider);
        let edges = vec![HierarchyEdge::new("admin", "user")];
        let pipeline = AuthorizationPipeline::new(
            IdentityVerifier::new(provider.clone(), Duration::from_millis(200)),
            Arc::new(SnapshotCache::new(source.clone(), SnapshotCacheConfig::default())),
            Arc::new(RoleHierarchyStore::preloaded(HierarchyMap::from_edges(edges))),
            source,
            settings,
        );
        Harness { pipeline, provider }
    }

    fn users() -> FakeProvider {
        FakeProvider::new()
            .with_user("user-token", "user-123", "user")
            .with_user("admin-token", "admin-1", "admin")
    }

    fn req(resource: &'static str, action: Action) -> RouteRequirement {
        RouteRequirement::new(resource, action).unwrap()
    }

    fn request<'a>(requirement: Option<&'a RouteRequirement>, credential: Option<&'a str>) -> AuthorizationRequest<'a> {
        AuthorizationRequest {
            requirement,
            method: "GET",
            path: "/api/contents",
            credential,
        }
    }

    fn contents_select(value: bool) -> FakeSource {
        FakeSource::new().with_snapshot("user", json!({ "contents": { "select": value } }))
    }

    #[tokio::test]
    async fn untagged_route_is_allowed_without_verification() {
        let h = harness(contents_select(false), users(), PipelineSettings::default());
        let decision = h.pipeline.authorize(request(None, Some("user-token"))).await;
        assert_eq!(decision, Decision::NoRequirement);
        assert!(decision.is_allowed());
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn granted_action_without_condition_is_permitted_with_identity() {
        let h = harness(contents_select(true), users(), PipelineSettings::default());
        let r = req("contents", Action::Select);
        let decision = h.pipeline.authorize(request(Some(&r), Some("user-token"))).await;
        assert_eq!(decision.state(), PipelineState::Permitted);
        let grant = decision.grant().unwrap();
        assert_eq!(grant.identity.id.as_str(), "user-123");
        assert_eq!(grant.granted_by, Role::from("user"));
        assert!(grant.row_filter.is_none());
    }

    #[tokio::test]
    async fn false_or_absent_flag_is_denied() {
        let h = harness(contents_select(false), users(), PipelineSettings::default());
        let r = req("contents", Action::Select);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::InsufficientPermission)
        );

        let r = req("contents", Action::Delete);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::InsufficientPermission)
        );

        let r = req("payments", Action::Select);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::InsufficientPermission)
        );
    }

    #[tokio::test]
    async fn missing_credential_short_circuits() {
        let h = harness(contents_select(true), users(), PipelineSettings::default());
        let r = req("contents", Action::Select);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), None)).await,
            Decision::Denied(DenyReason::NoCredential)
        );
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn rejected_credential_is_denied() {
        let h = harness(contents_select(true), users(), PipelineSettings::default());
        let r = req("contents", Action::Select);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("forged"))).await,
            Decision::Denied(DenyReason::InvalidCredential)
        );
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn legacy_condition_referencing_caller_is_permitted() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition(
                "user",
                "contents",
                Action::Update,
                ConditionRecord::legacy("owner_id = auth.uid()"),
            );
        let h = harness(source, users(), PipelineSettings::default());
        let r = req("contents", Action::Update);
        let decision = h.pipeline.authorize(request(Some(&r), Some("user-token"))).await;
        assert_eq!(decision.state(), PipelineState::Permitted);
    }

    #[tokio::test]
    async fn legacy_condition_without_caller_is_denied() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition(
                "user",
                "contents",
                Action::Update,
                ConditionRecord::legacy("owner_id = 'someone-else'"),
            );
        let h = harness(source, users(), PipelineSettings::default());
        let r = req("contents", Action::Update);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn structured_mode_denies_legacy_only_rules() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition(
                "user",
                "contents",
                Action::Update,
                ConditionRecord::legacy("owner_id = auth.uid()"),
            );
        let settings = PipelineSettings {
            condition_mode: ConditionMode::Structured,
            ..PipelineSettings::default()
        };
        let h = harness(source, users(), settings);
        let r = req("contents", Action::Update);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn row_predicate_is_attached_as_filter() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition(
                "user",
                "contents",
                Action::Update,
                ConditionRecord::structured(json!({
                    "eq": { "field": "row:owner_id", "value": { "caller": "id" } }
                })),
            );
        let settings = PipelineSettings {
            condition_mode: ConditionMode::Structured,
            ..PipelineSettings::default()
        };
        let h = harness(source, users(), settings);
        let r = req("contents", Action::Update);
        let decision = h.pipeline.authorize(request(Some(&r), Some("user-token"))).await;
        let filter = decision.grant().unwrap().row_filter.clone().unwrap();

        let mut own = Map::new();
        own.insert("owner_id".into(), json!("user-123"));
        let mut other = Map::new();
        other.insert("owner_id".into(), json!("user-999"));
        assert!(filter.admits(&own));
        assert!(!filter.admits(&other));
    }

    #[tokio::test]
    async fn malformed_predicate_denies() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition(
                "user",
                "contents",
                Action::Update,
                ConditionRecord::structured(json!({ "gt": 1 })),
            );
        let h = harness(source, users(), PipelineSettings::default());
        let r = req("contents", Action::Update);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn hierarchy_is_not_consulted_in_snapshot_only_mode() {
        let source = contents_select(true).with_snapshot("admin", json!({}));
        let h = harness(source, users(), PipelineSettings::default());
        let r = req("contents", Action::Select);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("admin-token"))).await,
            Decision::Denied(DenyReason::InsufficientPermission)
        );
    }

    #[tokio::test]
    async fn hierarchy_mode_inherits_parent_grants() {
        let source = contents_select(true).with_snapshot("admin", json!({}));
        let settings = PipelineSettings {
            inheritance: InheritanceMode::Hierarchy,
            ..PipelineSettings::default()
        };
        let h = harness(source, users(), settings);
        let r = req("contents", Action::Select);
        let decision = h.pipeline.authorize(request(Some(&r), Some("admin-token"))).await;
        let grant = decision.grant().unwrap();
        assert_eq!(grant.identity.role, Role::from("admin"));
        assert_eq!(grant.granted_by, Role::from("user"));
    }

    #[tokio::test]
    async fn negated_predicate_over_missing_attribute_denies() {
        let provider = FakeProvider::new().with_subject(
            "no-email",
            crate::identity::VerifiedSubject {
                subject_id: Some("user-123".into()),
                claims: json!({ "role": "user" }).as_object().cloned().unwrap(),
            },
        );
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition(
                "user",
                "contents",
                Action::Update,
                ConditionRecord::structured(json!({
                    "not": { "eq": { "field": "row:owner_email", "value": { "caller": "email" } } }
                })),
            );
        let h = harness(source, provider, PipelineSettings::default());
        let r = req("contents", Action::Update);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("no-email"))).await,
            Decision::Denied(DenyReason::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn condition_lookup_failure_denies() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_failing_condition("user");
        let h = harness(source, users(), PipelineSettings::default());
        let r = req("contents", Action::Update);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn slow_condition_lookup_denies() {
        let source = FakeSource::new()
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_condition_delay(Duration::from_millis(300));
        let settings = PipelineSettings {
            condition_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let h = harness(source, users(), settings);
        let r = req("contents", Action::Update);
        let started = std::time::Instant::now();
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::ConditionFailed)
        );
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn unconditional_ancestor_grant_beats_failing_own_condition() {
        let source = FakeSource::new()
            .with_snapshot("admin", json!({ "contents": { "update": true } }))
            .with_snapshot("user", json!({ "contents": { "update": true } }))
            .with_failing_condition("admin");
        let settings = PipelineSettings {
            inheritance: InheritanceMode::Hierarchy,
            ..PipelineSettings::default()
        };
        let h = harness(source, users(), settings);
        let r = req("contents", Action::Update);
        let decision = h.pipeline.authorize(request(Some(&r), Some("admin-token"))).await;
        let grant = decision.grant().unwrap();
        assert_eq!(grant.granted_by, Role::from("user"));
        assert!(grant.row_filter.is_none());
    }

    #[tokio::test]
    async fn path_inference_applies_only_when_enabled() {
        let settings = PipelineSettings {
            enforcement: EnforcementMode::AnnotationThenPath,
            ..PipelineSettings::default()
        };
        let h = harness(contents_select(false), users(), settings);
        assert_eq!(
            h.pipeline.authorize(request(None, Some("user-token"))).await,
            Decision::Denied(DenyReason::InsufficientPermission)
        );

        let h = harness(contents_select(false), users(), PipelineSettings::default());
        assert_eq!(
            h.pipeline.authorize(request(None, Some("user-token"))).await,
            Decision::NoRequirement
        );
    }

    #[tokio::test]
    async fn snapshot_failure_denies() {
        let source = FakeSource::new().with_failing_role("user");
        let h = harness(source, users(), PipelineSettings::default());
        let r = req("contents", Action::Select);
        assert_eq!(
            h.pipeline.authorize(request(Some(&r), Some("user-token"))).await,
            Decision::Denied(DenyReason::InsufficientPermission)
        );
    }
}
