use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        BeginRequest, GameOverRequest, GameOverResponse, ScoreReportResponse, ScoreRequest,
        SessionView, SignInRequest,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes driving the client session state machine.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-out", post(sign_out))
        .route("/session/begin", post(begin))
        .route("/session/tutorial/finish", post(finish_tutorial))
        .route("/session/score", post(report_score))
        .route("/session/game-over", post(game_over))
        .route("/session/restart", post(restart))
        .route("/session/menu", post(return_to_menu))
}

/// Current phase, player and round.
#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Session snapshot", body = SessionView))
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionView> {
    Json(session_service::get_session(&state).await)
}

/// Adopt the identity delivered by the auth provider and reconcile its profile.
#[utoipa::path(
    post,
    path = "/session/sign-in",
    tag = "session",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in; profile reconciled", body = SessionView),
        (status = 400, description = "Invalid identity")
    )
)]
pub async fn sign_in(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SignInRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::sign_in(&state, payload.into()).await?;
    Ok(Json(view))
}

/// Drop the current identity and go back to the welcome screen.
#[utoipa::path(
    post,
    path = "/session/sign-out",
    tag = "session",
    responses((status = 200, description = "Signed out", body = SessionView))
)]
pub async fn sign_out(State(state): State<SharedState>) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::sign_out(&state).await?))
}

/// Leave the welcome screen with a difficulty.
#[utoipa::path(
    post,
    path = "/session/begin",
    tag = "session",
    request_body = BeginRequest,
    responses(
        (status = 200, description = "Tutorial or round started", body = SessionView),
        (status = 401, description = "No player signed in"),
        (status = 409, description = "Not on the welcome screen")
    )
)]
pub async fn begin(
    State(state): State<SharedState>,
    Json(payload): Json<BeginRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::begin(&state, payload).await?))
}

/// Dismiss the tutorial and start the first round.
#[utoipa::path(
    post,
    path = "/session/tutorial/finish",
    tag = "session",
    responses(
        (status = 200, description = "Round started", body = SessionView),
        (status = 409, description = "Tutorial not shown")
    )
)]
pub async fn finish_tutorial(
    State(state): State<SharedState>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::finish_tutorial(&state).await?))
}

/// Report the running total of the current round.
#[utoipa::path(
    post,
    path = "/session/score",
    tag = "session",
    request_body = ScoreRequest,
    responses(
        (status = 200, description = "Score accepted", body = ScoreReportResponse),
        (status = 409, description = "No round running")
    )
)]
pub async fn report_score(
    State(state): State<SharedState>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<ScoreReportResponse>, AppError> {
    Ok(Json(
        session_service::report_score(&state, payload.score).await?,
    ))
}

/// End the round; safe to repeat while on the game-over screen.
#[utoipa::path(
    post,
    path = "/session/game-over",
    tag = "session",
    request_body = GameOverRequest,
    responses(
        (status = 200, description = "Round summary", body = GameOverResponse),
        (status = 409, description = "No round running")
    )
)]
pub async fn game_over(
    State(state): State<SharedState>,
    Json(payload): Json<GameOverRequest>,
) -> Result<Json<GameOverResponse>, AppError> {
    Ok(Json(session_service::game_over(&state, payload).await?))
}

/// Play again with the same difficulty.
#[utoipa::path(
    post,
    path = "/session/restart",
    tag = "session",
    responses(
        (status = 200, description = "New round started", body = SessionView),
        (status = 409, description = "Not on the game-over screen")
    )
)]
pub async fn restart(State(state): State<SharedState>) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::restart(&state).await?))
}

/// Leave the game-over screen.
#[utoipa::path(
    post,
    path = "/session/menu",
    tag = "session",
    responses(
        (status = 200, description = "Back on the welcome screen", body = SessionView),
        (status = 409, description = "Already on the welcome screen")
    )
)]
pub async fn return_to_menu(
    State(state): State<SharedState>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::return_to_menu(&state).await?))
}
