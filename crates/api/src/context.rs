use serde::Serialize;

use contentgate_auth::Identity;
use contentgate_core::Role;

/// Verified caller of a permitted request.
///
/// Inserted into the request extensions by the guard; present exactly when
/// the route carried a requirement and the caller met it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedIdentity {
    identity: Identity,
    granted_by: Role,
}

impl AuthenticatedIdentity {
    pub fn new(identity: Identity, granted_by: Role) -> Self {
        Self { identity, granted_by }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Role whose grant admitted the request.
    pub fn granted_by(&self) -> &Role {
        &self.granted_by
    }
}
