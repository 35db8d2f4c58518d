//! Read-only projections of the remote store: leaderboards and profiles.

use crate::{
    dao::{models::Difficulty, profile_store::ProfileStore},
    dto::leaderboard::{
        DifficultyLeaderboardResponse, LeaderboardEntry, LeaderboardResponse, ProfileResponse,
        ScoreEntry,
    },
    error::ServiceError,
    state::SharedState,
};

fn window(state: &SharedState, limit: Option<usize>) -> usize {
    limit.unwrap_or(state.config().leaderboard_size)
}

/// Best-score leaderboard. Empty while the store is unreachable.
pub async fn get_leaderboard(state: &SharedState, limit: Option<usize>) -> LeaderboardResponse {
    let profiles = state.leaderboard().top_n(window(state, limit)).await;
    LeaderboardResponse {
        entries: LeaderboardEntry::ranked(profiles),
    }
}

/// Highest logged rounds for one difficulty. Empty while the store is unreachable.
pub async fn get_difficulty_leaderboard(
    state: &SharedState,
    difficulty: &str,
    limit: Option<usize>,
) -> Result<DifficultyLeaderboardResponse, ServiceError> {
    let difficulty = difficulty
        .parse::<Difficulty>()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let entries = state
        .leaderboard()
        .top_scores(difficulty, window(state, limit))
        .await
        .into_iter()
        .map(ScoreEntry::from)
        .collect();
    Ok(DifficultyLeaderboardResponse {
        difficulty,
        entries,
    })
}

/// Stored profile of `uid`. Unlike the leaderboards, store failures are reported.
pub async fn get_profile(state: &SharedState, uid: &str) -> Result<ProfileResponse, ServiceError> {
    state
        .slot()
        .get(uid)
        .await?
        .map(ProfileResponse::from)
        .ok_or_else(|| ServiceError::NotFound(format!("no profile for uid {uid}")))
}
