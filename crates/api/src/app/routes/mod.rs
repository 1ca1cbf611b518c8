use axum::http::Method;

use contentgate_core::{Action, GateResult};

use crate::registry::RouteRegistry;

pub mod contents;
pub mod system;

/// Register every endpoint with its requirement.
pub fn register(registry: RouteRegistry) -> GateResult<RouteRegistry> {
    registry
        .open(Method::GET, "/health", system::health)?
        .open(Method::GET, "/routes", system::routes)?
        .tagged(Method::GET, "/whoami", "profiles", Action::Select, system::whoami)?
        .tagged(Method::GET, "/api/contents", "contents", Action::Select, contents::list_contents)?
        .tagged(Method::POST, "/api/contents", "contents", Action::Insert, contents::create_content)?
        .tagged(Method::PUT, "/api/contents/:id", "contents", Action::Update, contents::update_content)?
        .tagged(Method::DELETE, "/api/contents/:id", "contents", Action::Delete, contents::delete_content)
}
