//! Collaborator wiring: identity provider, permission source, pipeline.

use std::sync::Arc;

use tracing::{info, warn};

use contentgate_auth::{
    AuthorizationPipeline, Hs256IdentityProvider, IdentityProvider, IdentityVerifier, PermissionSource,
    RoleHierarchyStore, SnapshotCache, SnapshotCacheConfig,
};
use contentgate_core::GateResult;
use contentgate_infra::{InMemoryPermissionSource, PgPermissionSource, RemoteIdentityProvider};

use crate::config::{AppConfig, IdentityConfig};

pub fn build_identity_provider(config: &IdentityConfig) -> GateResult<Arc<dyn IdentityProvider>> {
    Ok(match config {
        IdentityConfig::Jwt { secret, audience } => {
            Arc::new(Hs256IdentityProvider::new(secret.as_bytes(), audience.as_deref())?)
        }
        IdentityConfig::Remote { url, api_key } => Arc::new(RemoteIdentityProvider::new(url, api_key)?),
    })
}

pub async fn build_permission_source(config: &AppConfig) -> GateResult<Arc<dyn PermissionSource>> {
    match &config.database_url {
        Some(url) => {
            let source = PgPermissionSource::connect(url).await?;
            info!("permission source: postgres");
            Ok(Arc::new(source))
        }
        None => {
            warn!("DATABASE_URL not set; using an empty in-memory permission source (every tagged route denies)");
            Ok(Arc::new(InMemoryPermissionSource::new()))
        }
    }
}

/// Assemble the pipeline and load the role hierarchy.
///
/// A failed hierarchy scan is logged and leaves the store unloaded: every
/// role then has no ancestors, which can only deny more.
pub async fn build_pipeline(
    config: &AppConfig,
    provider: Arc<dyn IdentityProvider>,
    source: Arc<dyn PermissionSource>,
) -> Arc<AuthorizationPipeline> {
    let hierarchy = Arc::new(RoleHierarchyStore::new());
    if let Err(e) = hierarchy.load(source.as_ref()).await {
        warn!(error = %e, "role hierarchy could not be loaded; inheritance disabled");
    }

    let snapshots = Arc::new(SnapshotCache::new(
        source.clone(),
        SnapshotCacheConfig {
            ttl: config.snapshot_ttl,
            fetch_timeout: config.upstream_timeout,
        },
    ));

    let settings = config.pipeline_settings();
    info!(
        inheritance = ?settings.inheritance,
        condition_mode = ?settings.condition_mode,
        enforcement = ?settings.enforcement,
        snapshot_ttl_secs = config.snapshot_ttl.as_secs(),
        "authorization pipeline ready"
    );

    Arc::new(AuthorizationPipeline::new(
        IdentityVerifier::new(provider, config.upstream_timeout),
        snapshots,
        hierarchy,
        source,
        settings,
    ))
}
