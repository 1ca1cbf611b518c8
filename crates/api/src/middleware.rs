use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{info, Instrument};

use contentgate_auth::{AuthorizationPipeline, AuthorizationRequest, Decision, RouteRequirement};
use contentgate_observability::{request_span, RequestId};

use crate::app::errors;
use crate::context::AuthenticatedIdentity;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-route guard state: the shared pipeline plus the route's tag.
#[derive(Clone)]
pub struct GuardState {
    pub pipeline: Arc<AuthorizationPipeline>,
    pub requirement: Option<RouteRequirement>,
}

pub async fn guard_middleware(
    State(state): State<GuardState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let request_id = RequestId::new();
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let credential = extract_bearer(req.headers()).map(str::to_string);
    let span = request_span(request_id, &method, &path);

    async move {
        let decision = state
            .pipeline
            .authorize(AuthorizationRequest {
                requirement: state.requirement.as_ref(),
                method: &method,
                path: &path,
                credential: credential.as_deref(),
            })
            .await;

        let mut response = match decision {
            Decision::NoRequirement => next.run(req).await,
            Decision::Permitted(grant) => {
                let grant = *grant;
                req.extensions_mut()
                    .insert(AuthenticatedIdentity::new(grant.identity, grant.granted_by));
                if let Some(filter) = grant.row_filter {
                    req.extensions_mut().insert(filter);
                }
                next.run(req).await
            }
            Decision::Denied(reason) => {
                info!(%reason, "not authorized");
                errors::not_authorized()
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Bearer token from the `Authorization` header. The scheme is matched
/// case-insensitively. Any other scheme counts as no credential; an empty
/// token is passed on and rejected by the verifier.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim())
}
