//! Content endpoints.
//!
//! Storage is not wired in: handlers echo the caller. A row-scoped grant
//! (an attached [`RowFilter`]) is applied to the row the request touches.
//! For inserts that is the submitted body. Update and delete target a stored
//! row that is not available here, so a row-scoped grant on them denies.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value as JsonValue};

use contentgate_auth::RowFilter;

use crate::app::errors;
use crate::context::AuthenticatedIdentity;

pub async fn list_contents(
    Extension(caller): Extension<AuthenticatedIdentity>,
    row_filter: Option<Extension<RowFilter>>,
) -> axum::response::Response {
    Json(json!({
        "caller": caller.identity().id.as_str(),
        "items": [],
        "row_filter": row_filter.map(|Extension(f)| f.predicate().clone()),
    }))
    .into_response()
}

pub async fn create_content(
    Extension(caller): Extension<AuthenticatedIdentity>,
    row_filter: Option<Extension<RowFilter>>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    let row = match checked_row(body, row_filter.as_ref().map(|Extension(f)| f)) {
        Ok(row) => row,
        Err(resp) => return resp,
    };
    (
        StatusCode::CREATED,
        Json(json!({
            "created_by": caller.identity().id.as_str(),
            "content": row,
        })),
    )
        .into_response()
}

pub async fn update_content(
    Path(id): Path<String>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    row_filter: Option<Extension<RowFilter>>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    if row_filter.is_some() {
        return stored_row_unavailable(&id);
    }
    let row = match checked_row(body, None) {
        Ok(row) => row,
        Err(resp) => return resp,
    };
    Json(json!({
        "id": id,
        "updated_by": caller.identity().id.as_str(),
        "content": row,
    }))
    .into_response()
}

pub async fn delete_content(
    Path(id): Path<String>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    row_filter: Option<Extension<RowFilter>>,
) -> axum::response::Response {
    if row_filter.is_some() {
        return stored_row_unavailable(&id);
    }
    Json(json!({
        "id": id,
        "deleted_by": caller.identity().id.as_str(),
    }))
    .into_response()
}

/// A row-scoped grant can only be checked against the stored row, never
/// against what the client sent.
fn stored_row_unavailable(id: &str) -> axum::response::Response {
    tracing::info!(content_id = %id, "row-scoped grant on a stored row that cannot be checked");
    errors::not_authorized()
}

/// The body must be a JSON object; under a row-scoped grant it must also
/// satisfy the filter, otherwise the request is denied like any other.
fn checked_row(
    body: JsonValue,
    filter: Option<&RowFilter>,
) -> Result<Map<String, JsonValue>, axum::response::Response> {
    let JsonValue::Object(row) = body else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_body",
            "content must be a JSON object",
        ));
    };
    if let Some(filter) = filter {
        if !filter.admits(&row) {
            tracing::info!("row outside the caller's grant");
            return Err(errors::not_authorized());
        }
    }
    Ok(row)
}
