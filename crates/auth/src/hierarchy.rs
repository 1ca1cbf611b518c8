//! Role hierarchy: child -> parents adjacency, loaded once.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use contentgate_core::{GateResult, Role};

use crate::source::{HierarchyEdge, PermissionSource};

/// Immutable adjacency map built from hierarchy edges.
///
/// Parents are kept sorted and de-duplicated, so the map is independent of
/// the order in which edges were read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyMap {
    parents: BTreeMap<Role, Vec<Role>>,
}

impl HierarchyMap {
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = HierarchyEdge>,
    {
        let mut sets: BTreeMap<Role, BTreeSet<Role>> = BTreeMap::new();
        for edge in edges {
            if edge.child.is_empty() || edge.parent.is_empty() {
                warn!(child = %edge.child, parent = %edge.parent, "skipping hierarchy edge with blank role");
                continue;
            }
            if edge.child == edge.parent {
                continue;
            }
            sets.entry(edge.child).or_default().insert(edge.parent);
        }

        Self {
            parents: sets
                .into_iter()
                .map(|(child, parents)| (child, parents.into_iter().collect()))
                .collect(),
        }
    }

    pub fn parents_of(&self, role: &Role) -> &[Role] {
        self.parents.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every role reachable through parent links, excluding `role` itself.
    ///
    /// Terminates on cyclic graphs: each role is expanded at most once.
    pub fn ancestors_of(&self, role: &Role) -> BTreeSet<Role> {
        let mut visited: BTreeSet<Role> = BTreeSet::new();
        let mut stack: Vec<&Role> = self.parents_of(role).iter().collect();

        while let Some(next) = stack.pop() {
            if next == role || !visited.insert(next.clone()) {
                continue;
            }
            stack.extend(self.parents_of(next).iter());
        }

        visited
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// One-shot loader around [`HierarchyMap`].
///
/// `load` scans the edge rows exactly once for the lifetime of the store;
/// concurrent callers wait for the same scan. After that, reads are lock-free.
#[derive(Debug, Default)]
pub struct RoleHierarchyStore {
    map: OnceCell<HierarchyMap>,
}

impl RoleHierarchyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store that is already loaded (tests, fixed deployments).
    pub fn preloaded(map: HierarchyMap) -> Self {
        Self {
            map: OnceCell::new_with(Some(map)),
        }
    }

    /// Load the adjacency map. Idempotent; a failed scan leaves the store
    /// unloaded so that a later call can retry.
    pub async fn load(&self, source: &dyn PermissionSource) -> GateResult<()> {
        self.map
            .get_or_try_init(|| async {
                let edges = source.list_hierarchy_edges().await?;
                let map = HierarchyMap::from_edges(edges);
                info!(roles = map.len(), "role hierarchy loaded");
                GateResult::Ok(map)
            })
            .await?;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.map.initialized()
    }

    /// Ancestors of `role`; empty when the store was never loaded.
    pub fn ancestors_of(&self, role: &Role) -> BTreeSet<Role> {
        self.map
            .get()
            .map(|m| m.ancestors_of(role))
            .unwrap_or_default()
    }

    pub fn map(&self) -> Option<&HierarchyMap> {
        self.map.get()
    }
}
