//! Identity provider backed by a hosted auth service.
//!
//! `GET {base_url}/auth/v1/user` with the caller's bearer token and the
//! service `apikey`; a 2xx JSON user object is the verified subject.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use tracing::debug;

use contentgate_auth::{IdentityProvider, VerifiedSubject};
use contentgate_core::{GateError, GateResult};

const USER_PATH: &str = "/auth/v1/user";

#[derive(Debug, Clone)]
pub struct RemoteIdentityProvider {
    client: reqwest::Client,
    user_url: String,
    api_key: String,
}

impl RemoteIdentityProvider {
    /// Timeouts are applied by the verifier, not by the client.
    pub fn new(base_url: &str, api_key: &str) -> GateResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(GateError::configuration("identity provider URL must not be empty"));
        }
        if api_key.trim().is_empty() {
            return Err(GateError::configuration("identity provider key must not be empty"));
        }
        reqwest::Url::parse(base_url)
            .map_err(|e| GateError::configuration(format!("invalid identity provider URL: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            user_url: format!("{base_url}{USER_PATH}"),
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn verify_credential(&self, token: &str) -> GateResult<VerifiedSubject> {
        let resp = self
            .client
            .get(&self.user_url)
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| GateError::authentication(format!("identity provider unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, "identity provider rejected credential");
            return Err(GateError::authentication(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "credential rejected by provider".to_string(),
                other => format!("identity provider returned {other}"),
            }));
        }

        let body: JsonValue = resp
            .json()
            .await
            .map_err(|e| GateError::authentication(format!("unreadable provider response: {e}")))?;
        subject_from_user(body)
    }
}

/// The user object's `id` is the subject; every field is kept as a claim.
fn subject_from_user(body: JsonValue) -> GateResult<VerifiedSubject> {
    let JsonValue::Object(claims) = body else {
        return Err(GateError::authentication("provider response is not an object"));
    };
    let subject_id = claims
        .get("id")
        .or_else(|| claims.get("sub"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    Ok(VerifiedSubject {
        subject_id,
        claims,
    })
}
