//! Permission snapshot cache.
//!
//! A snapshot is the precomputed `resource -> action flags` map of one role.
//! Entries live for a bounded TTL and can be invalidated explicitly. Every
//! entry records the cache generation it was filled under; bumping the
//! generation (any invalidation) makes older entries unreadable and stops a
//! refill that raced the invalidation from being stored.
//!
//! Misses are single-flight per role: concurrent callers share one fetch and
//! its outcome, failure included. A failed outcome lives only as long as the
//! flight; the next miss after it starts a new one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use contentgate_core::{ActionFlags, GateError, GateResult, Resource, Role};

use crate::source::PermissionSource;

/// Parsed snapshot of a single role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSnapshot {
    resources: HashMap<Resource, ActionFlags>,
}

impl PermissionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: impl Into<Resource>, flags: ActionFlags) -> Self {
        self.resources.insert(resource.into(), flags);
        self
    }

    /// Parse the raw snapshot object of `role`.
    ///
    /// A value that is not an object fails the whole role. A single resource
    /// whose value is not a well-formed action map is dropped (deny) and logged.
    pub fn parse(role: &Role, value: &JsonValue) -> GateResult<Self> {
        let obj = value.as_object().ok_or_else(|| {
            GateError::data(format!("snapshot for role '{role}' is not an object"))
        })?;

        let mut resources = HashMap::with_capacity(obj.len());
        for (resource, flags) in obj {
            if !flags.is_object() {
                warn!(%role, %resource, "dropping malformed snapshot entry (not an object)");
                continue;
            }
            match serde_json::from_value::<ActionFlags>(flags.clone()) {
                Ok(f) => {
                    resources.insert(Resource::new(resource.clone()), f);
                }
                Err(e) => {
                    warn!(%role, %resource, error = %e, "dropping malformed snapshot entry");
                }
            }
        }

        Ok(Self { resources })
    }

    pub fn get(&self, resource: &Resource) -> Option<ActionFlags> {
        self.resources.get(resource).copied()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Cached snapshot plus the generation it was filled under.
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    pub snapshot: Arc<PermissionSnapshot>,
    pub generation: u64,
    pub fetched_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCacheConfig {
    /// Entry lifetime. `Duration::ZERO` disables caching (fetch per decision).
    pub ttl: Duration,
    /// Upper bound on one backing fetch.
    pub fetch_timeout: Duration,
}

impl Default for SnapshotCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(2),
        }
    }
}

/// Outcome of one refill, shared by everyone who joined it.
type Flight = OnceCell<Option<Arc<PermissionSnapshot>>>;

pub struct SnapshotCache {
    source: Arc<dyn PermissionSource>,
    config: SnapshotCacheConfig,
    entries: RwLock<HashMap<Role, CachedSnapshot>>,
    generation: AtomicU64,
    inflight: Mutex<HashMap<Role, Arc<Flight>>>,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn PermissionSource>, config: SnapshotCacheConfig) -> Self {
        Self {
            source,
            config,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> SnapshotCacheConfig {
        self.config
    }

    /// Current cache generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether `entry` was filled under the current generation.
    pub fn is_current(&self, entry: &CachedSnapshot) -> bool {
        entry.generation == self.generation()
    }

    /// Action flags of `role` on `resource`. `None` means deny all.
    pub async fn permissions_for(&self, role: &Role, resource: &Resource) -> Option<ActionFlags> {
        self.snapshot_for(role).await?.get(resource)
    }

    /// Full snapshot of `role`; `None` when it could not be obtained
    /// (collaborator failure, timeout, malformed data).
    pub async fn snapshot_for(&self, role: &Role) -> Option<Arc<PermissionSnapshot>> {
        if let Some(hit) = self.fresh(role) {
            return Some(hit.snapshot);
        }

        let flight = self.join_flight(role);
        let outcome = flight.get_or_init(|| self.refill(role)).await.clone();
        self.end_flight(role, &flight);
        outcome
    }

    async fn refill(&self, role: &Role) -> Option<Arc<PermissionSnapshot>> {
        // A previous flight may have stored the entry while we joined.
        if let Some(hit) = self.fresh(role) {
            return Some(hit.snapshot);
        }

        let generation = self.generation();
        let snapshot = match self.fetch(role).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                warn!(%role, error = %e, "permission snapshot unavailable; denying");
                return None;
            }
        };

        if self.config.ttl.is_zero() {
            return Some(snapshot);
        }
        if generation != self.generation() {
            debug!(%role, "snapshot invalidated during refill; not caching");
            return Some(snapshot);
        }

        if let Ok(mut map) = self.entries.write() {
            map.insert(
                role.clone(),
                CachedSnapshot {
                    snapshot: snapshot.clone(),
                    generation,
                    fetched_at: Instant::now(),
                },
            );
        }
        Some(snapshot)
    }

    /// Cached entry for `role`, if fresh and current.
    pub fn cached(&self, role: &Role) -> Option<CachedSnapshot> {
        self.fresh(role)
    }

    /// Drop the entry of one role.
    pub fn invalidate(&self, role: &Role) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut map) = self.entries.write() {
            map.remove(role);
        }
        debug!(%role, "permission snapshot invalidated");
    }

    /// Drop every entry (e.g. after the snapshot producer re-ran).
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
        debug!("all permission snapshots invalidated");
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh(&self, role: &Role) -> Option<CachedSnapshot> {
        let map = self.entries.read().ok()?;
        let entry = map.get(role)?;
        if entry.fetched_at.elapsed() >= self.config.ttl || !self.is_current(entry) {
            return None;
        }
        Some(entry.clone())
    }

    fn join_flight(&self, role: &Role) -> Arc<Flight> {
        match self.inflight.lock() {
            Ok(mut map) => map.entry(role.clone()).or_default().clone(),
            // A poisoned registry only costs us the single-flight guarantee.
            Err(_) => Arc::new(Flight::new()),
        }
    }

    /// Retire a finished flight so its outcome is not reused by later misses.
    fn end_flight(&self, role: &Role, flight: &Arc<Flight>) {
        if let Ok(mut map) = self.inflight.lock() {
            if map.get(role).is_some_and(|current| Arc::ptr_eq(current, flight)) {
                map.remove(role);
            }
        }
    }

    #[cfg(test)]
    fn flights(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    async fn fetch(&self, role: &Role) -> GateResult<PermissionSnapshot> {
        let raw = tokio::time::timeout(self.config.fetch_timeout, self.source.permission_snapshot(role))
            .await
            .map_err(|_| GateError::data("snapshot fetch timed out"))??;

        match raw {
            None => Ok(PermissionSnapshot::new()),
            Some(JsonValue::Null) => Ok(PermissionSnapshot::new()),
            Some(value) => PermissionSnapshot::parse(role, &value),
        }
    }
}
