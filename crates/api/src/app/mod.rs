//! HTTP application wiring (Axum router + collaborator wiring).
//!
//! - `services.rs`: identity provider, permission source, pipeline
//! - `routes/`: HTTP handlers, registered with their requirements
//! - `errors.rs`: consistent error responses

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{BoxError, Extension, Router};
use tower::ServiceBuilder;

use contentgate_auth::{AuthorizationPipeline, PermissionSource};
use contentgate_core::GateResult;

use crate::config::AppConfig;
use crate::registry::{RouteRegistry, RouteTable};

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> GateResult<Router> {
    let source = services::build_permission_source(config).await?;
    build_app_with_source(config, source).await
}

/// Same as [`build_app`] over an explicit permission source.
pub async fn build_app_with_source(
    config: &AppConfig,
    source: Arc<dyn PermissionSource>,
) -> GateResult<Router> {
    let provider = services::build_identity_provider(&config.identity)?;
    let pipeline = services::build_pipeline(config, provider, source).await;
    let (router, _table) = build_router(pipeline, config.request_timeout)?;
    Ok(router)
}

/// Register every route against `pipeline`; the table is also served at
/// `GET /routes`.
pub fn build_router(
    pipeline: Arc<AuthorizationPipeline>,
    request_timeout: Duration,
) -> GateResult<(Router, RouteTable)> {
    let (router, table) = routes::register(RouteRegistry::new(pipeline))?.finish();
    let router = with_request_timeout(router.layer(Extension(table.clone())), request_timeout);
    Ok((router, table))
}

fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_layer_error))
            .timeout(timeout),
    )
}

async fn handle_layer_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        errors::json_error(StatusCode::REQUEST_TIMEOUT, "timeout", "request timed out")
    } else {
        tracing::error!(error = %err, "unhandled middleware error");
        errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error")
    }
}
