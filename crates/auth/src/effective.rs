//! Permission inheritance across the role hierarchy.

use std::collections::BTreeSet;
use std::str::FromStr;

use contentgate_core::{Action, ActionFlags, GateError, Role};

/// Whether enforcement walks the role hierarchy.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum InheritanceMode {
    /// Only the role's own snapshot counts; inheritance is the snapshot
    /// producer's job. The hierarchy is loaded but not consulted.
    #[default]
    SnapshotOnly,
    /// Effective permission = own snapshot ∪ every ancestor's snapshot.
    Hierarchy,
}

impl FromStr for InheritanceMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot_only" | "snapshot" => Ok(InheritanceMode::SnapshotOnly),
            "hierarchy" => Ok(InheritanceMode::Hierarchy),
            other => Err(GateError::configuration(format!("unknown inheritance mode '{other}'"))),
        }
    }
}

/// Union of the flags of `role` and all of its `ancestors`.
///
/// `None` when neither the role nor any ancestor has an entry for the
/// resource `lookup` is scoped to.
pub fn effective_permissions<F>(role: &Role, ancestors: &BTreeSet<Role>, lookup: F) -> Option<ActionFlags>
where
    F: Fn(&Role) -> Option<ActionFlags>,
{
    std::iter::once(role)
        .chain(ancestors.iter())
        .filter_map(&lookup)
        .reduce(|acc, flags| acc.union(&flags))
}

/// Roles (own first, then ancestors in order) whose flags grant `action`.
pub fn granting_roles<F>(role: &Role, ancestors: &BTreeSet<Role>, action: Action, lookup: F) -> Vec<Role>
where
    F: Fn(&Role) -> Option<ActionFlags>,
{
    std::iter::once(role)
        .chain(ancestors.iter())
        .filter(|r| lookup(*r).is_some_and(|f| f.allows(action)))
        .cloned()
        .collect()
}
