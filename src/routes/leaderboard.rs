use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::leaderboard::{
        DifficultyLeaderboardResponse, LeaderboardQuery, LeaderboardResponse, ProfileResponse,
    },
    error::AppError,
    services::public_service,
    state::SharedState,
};

/// Read-only ranking and profile routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/leaderboard/{difficulty}", get(get_difficulty_leaderboard))
        .route("/profiles/{uid}", get(get_profile))
}

/// Profiles ordered by best score.
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses(
        (status = 200, description = "Top profiles; empty while the store is unreachable", body = LeaderboardResponse),
        (status = 400, description = "Invalid limit")
    )
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LeaderboardQuery>>,
) -> Json<LeaderboardResponse> {
    Json(public_service::get_leaderboard(&state, query.limit).await)
}

/// Best logged rounds for one difficulty.
#[utoipa::path(
    get,
    path = "/leaderboard/{difficulty}",
    tag = "leaderboard",
    params(
        ("difficulty" = String, Path, description = "easy, medium or hard"),
        LeaderboardQuery
    ),
    responses(
        (status = 200, description = "Top rounds", body = DifficultyLeaderboardResponse),
        (status = 400, description = "Unknown difficulty or invalid limit")
    )
)]
pub async fn get_difficulty_leaderboard(
    State(state): State<SharedState>,
    Path(difficulty): Path<String>,
    Valid(Query(query)): Valid<Query<LeaderboardQuery>>,
) -> Result<Json<DifficultyLeaderboardResponse>, AppError> {
    let response =
        public_service::get_difficulty_leaderboard(&state, &difficulty, query.limit).await?;
    Ok(Json(response))
}

/// Stored profile of one player.
#[utoipa::path(
    get,
    path = "/profiles/{uid}",
    tag = "leaderboard",
    params(("uid" = String, Path, description = "Identifier assigned by the identity provider")),
    responses(
        (status = 200, description = "Stored profile", body = ProfileResponse),
        (status = 404, description = "No profile for this uid"),
        (status = 503, description = "Profile store unreachable")
    )
)]
pub async fn get_profile(
    State(state): State<SharedState>,
    Path(uid): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    Ok(Json(public_service::get_profile(&state, &uid).await?))
}
