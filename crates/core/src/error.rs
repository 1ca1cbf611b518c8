//! Error taxonomy of the authorization engine.

use thiserror::Error;

/// Result type used across the engine.
pub type GateResult<T> = Result<T, GateError>;

/// Engine-level error.
///
/// Only `Configuration` is ever fatal (at boot). The other three are caught
/// at the pipeline boundary and turned into a single denial; their messages
/// are for server-side logs and must not reach the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Required startup parameters are missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing, malformed, expired or provider-rejected credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Verified identity lacks the permission, or its condition failed.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Snapshot, hierarchy or condition rows are malformed or unreadable.
    #[error("data error: {0}")]
    Data(String),
}

impl GateError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    /// Whether the error should abort process boot.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GateError::Configuration(_))
    }
}
