use tracing::warn;

use crate::{dao::profile_store::ProfileStore, dto::health::HealthResponse, state::SharedState};

/// Probe the remote store and report whether the daemon runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if let Err(err) = state.slot().health_check().await {
        warn!(error = %err, "profile store health check failed");
    }

    let backend = state.config().store.backend.as_str();
    let pending = state.pending_writes().get();
    if state.slot().is_degraded() {
        HealthResponse::degraded(backend, pending)
    } else {
        HealthResponse::ok(backend, pending)
    }
}
