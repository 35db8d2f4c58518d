use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Configured profile store backend.
    pub backend: String,
    /// Store writes issued but not yet finished.
    pub pending_writes: usize,
}

impl HealthResponse {
    /// The remote store answered the last health check.
    pub fn ok(backend: &str, pending_writes: usize) -> Self {
        Self {
            status: "ok".to_string(),
            backend: backend.to_string(),
            pending_writes,
        }
    }

    /// The remote store is unreachable; the client runs on its local cache.
    pub fn degraded(backend: &str, pending_writes: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            backend: backend.to_string(),
            pending_writes,
        }
    }
}
