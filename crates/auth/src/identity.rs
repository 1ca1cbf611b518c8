//! Identity verification: bearer credential -> verified [`Identity`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use contentgate_core::{CallerId, GateError, GateResult, Role};

/// Raw result of the identity provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifiedSubject {
    pub subject_id: Option<String>,
    pub claims: Map<String, JsonValue>,
}

/// External identity provider collaborator.
///
/// Implementations perform signature checks or remote introspection. They
/// must not cache: a credential may be revoked between two requests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_credential(&self, token: &str) -> GateResult<VerifiedSubject>;
}

#[async_trait]
impl<P> IdentityProvider for Arc<P>
where
    P: IdentityProvider + ?Sized,
{
    async fn verify_credential(&self, token: &str) -> GateResult<VerifiedSubject> {
        (**self).verify_credential(token).await
    }
}

/// Verified caller, created per request and dropped with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub id: CallerId,
    pub role: Role,
    pub email: Option<String>,
    pub audience: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub claims: Map<String, JsonValue>,
}

impl Identity {
    pub fn new(id: impl Into<CallerId>, role: impl Into<Role>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            email: None,
            audience: None,
            expires_at: None,
            claims: Map::new(),
        }
    }

    /// Claim lookup used by structured predicates.
    ///
    /// Typed fields win over the raw claim map so that `id`/`sub` and `role`
    /// always reflect what the verifier accepted.
    pub fn claim(&self, name: &str) -> Option<JsonValue> {
        match name {
            "id" | "sub" => Some(JsonValue::String(self.id.as_str().to_string())),
            "role" => Some(JsonValue::String(self.role.as_str().to_string())),
            "email" => self.email.clone().map(JsonValue::String),
            "aud" | "audience" => self.audience.clone().map(JsonValue::String),
            other => self.claims.get(other).cloned(),
        }
    }
}

/// Turns a bearer credential into an [`Identity`] via the provider.
#[derive(Clone)]
pub struct IdentityVerifier {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl IdentityVerifier {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn verify(&self, credential: &str) -> GateResult<Identity> {
        if credential.is_empty() {
            return Err(GateError::authentication("empty credential"));
        }
        if credential.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GateError::authentication("malformed credential"));
        }

        let subject = tokio::time::timeout(self.timeout, self.provider.verify_credential(credential))
            .await
            .map_err(|_| GateError::authentication("identity provider timed out"))??;

        identity_from_subject(subject, Utc::now())
    }
}

fn identity_from_subject(subject: VerifiedSubject, now: DateTime<Utc>) -> GateResult<Identity> {
    let VerifiedSubject { subject_id, claims } = subject;

    let id = subject_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| GateError::authentication("provider returned no subject"))?;

    let role = claims
        .get("role")
        .and_then(|v| v.as_str())
        .filter(|r| !r.trim().is_empty())
        .map(|r| Role::new(r.to_string()))
        .ok_or_else(|| GateError::authentication("identity carries no role"))?;

    let expires_at = match claims.get("exp") {
        None | Some(JsonValue::Null) => None,
        Some(v) => {
            let secs = v
                .as_i64()
                .ok_or_else(|| GateError::authentication("malformed exp claim"))?;
            let at = Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| GateError::authentication("malformed exp claim"))?;
            if at <= now {
                return Err(GateError::authentication("credential expired"));
            }
            Some(at)
        }
    };

    let email = claims.get("email").and_then(|v| v.as_str()).map(str::to_string);
    let audience = match claims.get("aud") {
        Some(JsonValue::String(a)) => Some(a.clone()),
        Some(JsonValue::Array(list)) => list.first().and_then(|a| a.as_str()).map(str::to_string),
        _ => None,
    };

    Ok(Identity {
        id: CallerId::new(id),
        role,
        email,
        audience,
        expires_at,
        claims,
    })
}
