use tracing::Span;
use uuid::Uuid;

/// Correlation id of one request. Time-ordered (UUIDv7) so log lines sort
/// by arrival.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Span wrapping the authorization and handling of one request.
pub fn request_span(id: RequestId, method: &str, path: &str) -> Span {
    tracing::info_span!("request", request_id = %id, method = %method, path = %path)
}
