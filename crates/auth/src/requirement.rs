//! Route requirements: which `(resource, action)` a handler needs.

use std::str::FromStr;

use serde::Serialize;

use contentgate_core::{Action, GateError, GateResult, Resource};

/// Static per-endpoint requirement, fixed at registration time.
///
/// "No requirement" is expressed as `Option::None` at the call sites, never
/// as a requirement with an empty resource; the constructor rejects that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RouteRequirement {
    resource: Resource,
    action: Action,
}

impl RouteRequirement {
    pub fn new(resource: impl Into<Resource>, action: Action) -> GateResult<Self> {
        let resource = resource.into();
        if resource.is_empty() {
            return Err(GateError::configuration(format!(
                "route requirement for '{action}' has an empty resource"
            )));
        }
        Ok(Self { resource, action })
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

impl core::fmt::Display for RouteRequirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

/// Which enforcement sources the pipeline honors.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Only route tags.
    #[default]
    Annotation,
    /// Route tag when present, otherwise the requirement inferred from the
    /// request path and verb.
    AnnotationThenPath,
}

impl FromStr for EnforcementMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "annotation" => Ok(EnforcementMode::Annotation),
            "annotation_then_path" => Ok(EnforcementMode::AnnotationThenPath),
            other => Err(GateError::configuration(format!("unknown enforcement mode '{other}'"))),
        }
    }
}

/// Map an HTTP verb to the action it performs.
pub fn action_for_method(method: &str) -> Option<Action> {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" => Some(Action::Select),
        "POST" => Some(Action::Insert),
        "PUT" | "PATCH" => Some(Action::Update),
        "DELETE" => Some(Action::Delete),
        _ => None,
    }
}

/// Infer a requirement from `path` below `prefix`: the first segment names
/// the resource, the verb names the action.
pub fn infer_from_path(method: &str, path: &str, prefix: &str) -> Option<RouteRequirement> {
    let action = action_for_method(method)?;
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if !prefix.is_empty() && !rest.is_empty() && !rest.starts_with('/') {
        // "/apiary" does not live under "/api".
        return None;
    }
    let segment = rest.trim_start_matches('/').split(['/', '?']).next()?;
    RouteRequirement::new(segment.to_string(), action).ok()
}

/// The single precedence rule between tagged and path-derived requirements.
pub fn resolve_requirement(
    mode: EnforcementMode,
    tagged: Option<&RouteRequirement>,
    method: &str,
    path: &str,
    prefix: &str,
) -> Option<RouteRequirement> {
    if let Some(req) = tagged {
        return Some(req.clone());
    }
    match mode {
        EnforcementMode::Annotation => None,
        EnforcementMode::AnnotationThenPath => infer_from_path(method, path, prefix),
    }
}
