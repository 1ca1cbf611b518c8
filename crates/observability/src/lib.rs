//! Tracing and request correlation (shared setup).

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Per-request correlation ids and spans.
pub mod request;

pub use request::{request_span, RequestId};
