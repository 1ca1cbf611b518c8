//! `contentgate-auth`: the authorization engine (fail-closed).
//!
//! Decoupled from HTTP and storage: identity providers and permission
//! sources are collaborators behind traits, implemented in `contentgate-infra`.

pub mod claims;
pub mod condition;
pub mod effective;
pub mod hierarchy;
pub mod identity;
pub mod jwt;
pub mod pipeline;
pub mod requirement;
pub mod snapshot;
pub mod source;

#[cfg(test)]
mod testing;

pub use claims::{validate_claims, Audience, ClaimsError, TokenClaims};
pub use condition::{
    ConditionEvaluator, ConditionMode, ConditionOutcome, Predicate, RowFilter, RuleCondition,
};
pub use effective::{effective_permissions, granting_roles, InheritanceMode};
pub use hierarchy::{HierarchyMap, RoleHierarchyStore};
pub use identity::{Identity, IdentityProvider, IdentityVerifier, VerifiedSubject};
pub use jwt::Hs256IdentityProvider;
pub use pipeline::{
    AuthorizationPipeline, AuthorizationRequest, Decision, DenyReason, Grant, PipelineSettings,
    PipelineState,
};
pub use requirement::{resolve_requirement, EnforcementMode, RouteRequirement};
pub use snapshot::{CachedSnapshot, PermissionSnapshot, SnapshotCache, SnapshotCacheConfig};
pub use source::{ConditionRecord, HierarchyEdge, PermissionSource, SourceError};
