use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Health check.
pub mod health;
/// Leaderboards and public profiles.
pub mod leaderboard;
/// Mute preference and renderer sound requests.
pub mod preferences;
/// Screen flow of the client session.
pub mod session;
/// Server-Sent Events stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(session::router())
        .merge(leaderboard::router())
        .merge(preferences::router());

    api_router.merge(docs::router()).with_state(state)
}
