use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::preferences::{MuteResponse, SoundRequest},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Audio preference and gameplay cue routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/preferences/mute", post(toggle_mute))
        .route("/sounds", post(play_sound))
}

/// Flip and persist the mute preference.
#[utoipa::path(
    post,
    path = "/preferences/mute",
    tag = "audio",
    responses((status = 200, description = "New mute state", body = MuteResponse))
)]
pub async fn toggle_mute(State(state): State<SharedState>) -> Json<MuteResponse> {
    Json(session_service::toggle_mute(&state).await)
}

/// Request a gameplay cue (pop, shoot or combo); it is delivered on the SSE stream.
#[utoipa::path(
    post,
    path = "/sounds",
    tag = "audio",
    request_body = SoundRequest,
    responses(
        (status = 202, description = "Cue queued"),
        (status = 400, description = "Cue reserved for the session controller")
    )
)]
pub async fn play_sound(
    State(state): State<SharedState>,
    Json(payload): Json<SoundRequest>,
) -> Result<StatusCode, AppError> {
    session_service::play_sound(&state, payload.kind).await?;
    Ok(StatusCode::ACCEPTED)
}
