use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use contentgate_api::config::AppConfig;
use contentgate_auth::ConditionRecord;
use contentgate_core::Action;
use contentgate_infra::InMemoryPermissionSource;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(source: InMemoryPermissionSource, extra: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = HashMap::from([("JWT_SECRET".into(), JWT_SECRET.into())]);
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let config = AppConfig::from_lookup(|k| vars.get(k).cloned()).expect("valid test config");

        // Same router as prod, but over an in-memory source and an ephemeral port.
        let app = contentgate_api::app::build_app_with_source(&config, Arc::new(source))
            .await
            .expect("app builds");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, sub: &str, role: &str, ttl: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": sub,
        "role": role,
        "email": format!("{sub}@example.com"),
        "iat": (now - ChronoDuration::seconds(5)).timestamp(),
        "exp": (now + ttl).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn user_token() -> String {
    mint_jwt(JWT_SECRET, "user-123", "user", ChronoDuration::minutes(10))
}

fn admin_token() -> String {
    mint_jwt(JWT_SECRET, "admin-1", "admin", ChronoDuration::minutes(10))
}

fn contents_select(value: bool) -> InMemoryPermissionSource {
    InMemoryPermissionSource::new().with_snapshot("user", json!({ "contents": { "select": value } }))
}

async fn assert_not_authorized(res: reqwest::Response) {
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "not_authorized", "message": "not authorized" }));
}

#[tokio::test]
async fn untagged_routes_need_no_credential() {
    let srv = TestServer::spawn(InMemoryPermissionSource::new(), &[]).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/routes")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let routes = body["routes"].as_array().unwrap();
    assert_eq!(routes.len(), 7);
    assert!(routes.iter().any(|r| r["method"] == "PUT"
        && r["path"] == "/api/contents/:id"
        && r["requirement"] == json!({ "resource": "contents", "action": "update" })));
    assert!(routes.iter().any(|r| r["path"] == "/health" && r["requirement"].is_null()));
}

#[tokio::test]
async fn granted_select_is_allowed_with_identity() {
    let srv = TestServer::spawn(contents_select(true), &[]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/api/contents"))
        .bearer_auth(user_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["caller"], "user-123");
    assert!(body["row_filter"].is_null());
}

#[tokio::test]
async fn denied_flag_yields_generic_401() {
    let srv = TestServer::spawn(contents_select(false), &[]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/api/contents"))
        .bearer_auth(user_token())
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;

    // No entry at all for the action.
    let res = client
        .delete(srv.url("/api/contents/1"))
        .bearer_auth(user_token())
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;
}

#[tokio::test]
async fn missing_or_bad_credentials_yield_401() {
    let srv = TestServer::spawn(contents_select(true), &[]).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/contents")).send().await.unwrap();
    assert_not_authorized(res).await;

    let forged = mint_jwt("other-secret", "user-123", "user", ChronoDuration::minutes(10));
    let res = client
        .get(srv.url("/api/contents"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;

    let expired = mint_jwt(JWT_SECRET, "user-123", "user", ChronoDuration::minutes(-10));
    let res = client
        .get(srv.url("/api/contents"))
        .bearer_auth(expired)
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;

    let res = client
        .get(srv.url("/api/contents"))
        .header("authorization", format!("Basic {}", user_token()))
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;
}

#[tokio::test]
async fn legacy_condition_with_caller_placeholder_allows_update() {
    let source = InMemoryPermissionSource::new()
        .with_snapshot("user", json!({ "contents": { "update": true } }))
        .with_condition(
            "user",
            "contents",
            Action::Update,
            ConditionRecord::legacy("owner_id = auth.uid()"),
        );
    let srv = TestServer::spawn(source, &[]).await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/api/contents/42"))
        .bearer_auth(user_token())
        .json(&json!({ "title": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["id"], "42");
    assert_eq!(body["updated_by"], "user-123");
}

fn owner_scoped(action: Action, flag: &str) -> InMemoryPermissionSource {
    let mut flags = serde_json::Map::new();
    flags.insert(flag.to_string(), json!(true));
    InMemoryPermissionSource::new()
        .with_snapshot("user", json!({ "contents": flags }))
        .with_condition(
            "user",
            "contents",
            action,
            ConditionRecord::structured(json!({
                "eq": { "field": "row:owner_id", "value": { "caller": "id" } }
            })),
        )
}

#[tokio::test]
async fn row_scoped_insert_is_checked_against_the_new_row() {
    let srv = TestServer::spawn(owner_scoped(Action::Insert, "insert"), &[("CONDITION_MODE", "structured")]).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/contents"))
        .bearer_auth(user_token())
        .json(&json!({ "owner_id": "user-123", "title": "mine" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(srv.url("/api/contents"))
        .bearer_auth(user_token())
        .json(&json!({ "owner_id": "user-999", "title": "theirs" }))
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;

    let res = client
        .post(srv.url("/api/contents"))
        .bearer_auth(user_token())
        .json(&json!({ "title": "no owner" }))
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;
}

#[tokio::test]
async fn row_scoped_update_cannot_be_claimed_through_the_body() {
    let srv = TestServer::spawn(owner_scoped(Action::Update, "update"), &[("CONDITION_MODE", "structured")]).await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/api/contents/someone-elses"))
        .bearer_auth(user_token())
        .json(&json!({ "owner_id": "user-123", "title": "forged owner" }))
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;
}

#[tokio::test]
async fn row_scoped_delete_is_denied() {
    let srv = TestServer::spawn(owner_scoped(Action::Delete, "delete"), &[("CONDITION_MODE", "structured")]).await;
    let client = reqwest::Client::new();

    let res = client
        .delete(srv.url("/api/contents/someone-elses"))
        .bearer_auth(user_token())
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;
}

#[tokio::test]
async fn unconditional_delete_is_allowed() {
    let source = InMemoryPermissionSource::new().with_snapshot("user", json!({ "contents": { "delete": true } }));
    let srv = TestServer::spawn(source, &[]).await;
    let client = reqwest::Client::new();

    let res = client
        .delete(srv.url("/api/contents/7"))
        .bearer_auth(user_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "id": "7", "deleted_by": "user-123" }));
}

#[tokio::test]
async fn admin_without_own_grant_is_denied_in_snapshot_only_mode() {
    let source = contents_select(true)
        .with_edge("admin", "user")
        .with_snapshot("admin", json!({}));
    let srv = TestServer::spawn(source, &[]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/api/contents"))
        .bearer_auth(admin_token())
        .send()
        .await
        .unwrap();
    assert_not_authorized(res).await;
}

#[tokio::test]
async fn admin_inherits_user_grant_in_hierarchy_mode() {
    let source = contents_select(true)
        .with_edge("admin", "user")
        .with_snapshot("admin", json!({}));
    let srv = TestServer::spawn(source, &[("INHERITANCE_MODE", "hierarchy")]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/api/contents"))
        .bearer_auth(admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["caller"], "admin-1");
}

#[tokio::test]
async fn whoami_reports_verified_identity() {
    let source = InMemoryPermissionSource::new().with_snapshot("user", json!({ "profiles": { "select": true } }));
    let srv = TestServer::spawn(source, &[]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(user_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["id"], "user-123");
    assert_eq!(body["role"], "user");
    assert_eq!(body["email"], "user-123@example.com");
    assert_eq!(body["granted_by"], "user");
}
