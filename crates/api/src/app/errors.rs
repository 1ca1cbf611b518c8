use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

pub const NOT_AUTHORIZED: &str = "not_authorized";

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// The one response for every denial, whatever the reason.
pub fn not_authorized() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, NOT_AUTHORIZED, "not authorized")
}
