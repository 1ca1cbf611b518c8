use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::context::AuthenticatedIdentity;
use crate::registry::RouteTable;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Every registered route and its requirement.
pub async fn routes(Extension(table): Extension<RouteTable>) -> impl IntoResponse {
    Json(json!({ "routes": table.entries() }))
}

pub async fn whoami(Extension(caller): Extension<AuthenticatedIdentity>) -> impl IntoResponse {
    let identity = caller.identity();
    Json(json!({
        "id": identity.id.as_str(),
        "role": identity.role.as_str(),
        "email": identity.email,
        "audience": identity.audience,
        "expires_at": identity.expires_at.map(|t| t.to_rfc3339()),
        "granted_by": caller.granted_by().as_str(),
    }))
}
