//! Local HS256 identity provider.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value as JsonValue};

use contentgate_core::{GateError, GateResult};

use crate::claims::{validate_claims, TokenClaims};
use crate::identity::{IdentityProvider, VerifiedSubject};

/// Verifies HS256-signed bearer tokens with a shared secret.
///
/// Signature and audience are checked by `jsonwebtoken`; the time window is
/// checked by [`validate_claims`] so that expiry handling is the same for
/// every provider.
pub struct Hs256IdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256IdentityProvider {
    pub fn new(secret: &[u8], audience: Option<&str>) -> GateResult<Self> {
        if secret.is_empty() {
            return Err(GateError::configuration("JWT secret must not be empty"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key: DecodingKey::from_secret(secret),
            validation,
        })
    }
}

#[async_trait]
impl IdentityProvider for Hs256IdentityProvider {
    async fn verify_credential(&self, token: &str) -> GateResult<VerifiedSubject> {
        let data = jsonwebtoken::decode::<Map<String, JsonValue>>(token, &self.key, &self.validation)
            .map_err(|e| GateError::authentication(format!("token rejected: {e}")))?;
        let raw = data.claims;

        let claims: TokenClaims = serde_json::from_value(JsonValue::Object(raw.clone()))
            .map_err(|e| GateError::authentication(format!("malformed claims: {e}")))?;
        validate_claims(&claims, Utc::now()).map_err(|e| GateError::authentication(e.to_string()))?;

        Ok(VerifiedSubject {
            subject_id: claims.sub,
            claims: raw,
        })
    }
}
