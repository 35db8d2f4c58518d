use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{Difficulty, ProfileEntity, ScoreEntity},
    dto::format_system_time,
};

/// Query string accepted by the leaderboard routes.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Number of entries to return (defaults to the configured leaderboard size).
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

/// One row of the best-score leaderboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position inside the returned window.
    pub position: usize,
    /// Identity provider uid.
    pub uid: String,
    /// Name shown on the board.
    pub display_name: String,
    /// Avatar, when the provider supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Highest score ever recorded.
    pub best_score: u64,
    /// Completed rounds.
    pub games_played: u64,
}

impl LeaderboardEntry {
    /// Number the profiles in the order the store returned them.
    pub fn ranked(profiles: Vec<ProfileEntity>) -> Vec<Self> {
        profiles
            .into_iter()
            .enumerate()
            .map(|(index, profile)| Self {
                position: index + 1,
                uid: profile.uid,
                display_name: profile.display_name,
                photo_url: profile.photo_url,
                best_score: profile.best_score,
                games_played: profile.games_played,
            })
            .collect()
    }
}

/// One row of a per-difficulty score board.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreEntry {
    /// Score log entry id.
    pub id: String,
    /// Uid of the player.
    pub user_id: String,
    /// Display name at the time of the round.
    pub user_name: String,
    /// Avatar at the time of the round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Final score of the round.
    pub score: u64,
    /// Difficulty the round was played at.
    pub difficulty: Difficulty,
    /// RFC 3339 timestamp of the round.
    pub created_at: String,
}

impl From<ScoreEntity> for ScoreEntry {
    fn from(entry: ScoreEntity) -> Self {
        Self {
            id: entry.id.to_string(),
            user_id: entry.user_id,
            user_name: entry.user_name,
            photo_url: entry.photo_url,
            score: entry.score,
            difficulty: entry.difficulty,
            created_at: format_system_time(entry.created_at),
        }
    }
}

/// Response of `GET /leaderboard`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    /// Highest best scores first.
    pub entries: Vec<LeaderboardEntry>,
}

/// Response of `GET /leaderboard/{difficulty}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DifficultyLeaderboardResponse {
    /// Requested difficulty.
    pub difficulty: Difficulty,
    /// Highest scores first; ties keep the earlier round first.
    pub entries: Vec<ScoreEntry>,
}

/// Public profile returned by `GET /profiles/{uid}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfileResponse {
    /// Identity provider uid.
    pub uid: String,
    /// Name shown on the board.
    pub display_name: String,
    /// Avatar, when the provider supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Highest score ever recorded.
    pub best_score: u64,
    /// Completed rounds.
    pub games_played: u64,
    /// RFC 3339 timestamp of the last sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

impl From<ProfileEntity> for ProfileResponse {
    fn from(profile: ProfileEntity) -> Self {
        Self {
            uid: profile.uid,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            best_score: profile.best_score,
            games_played: profile.games_played,
            last_seen: profile.last_seen.map(format_system_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::Identity;

    #[test]
    fn positions_follow_store_order() {
        let mut first = ProfileEntity::fresh(&Identity::anonymous("b"));
        first.best_score = 30;
        let second = ProfileEntity::fresh(&Identity::anonymous("a"));

        let entries = LeaderboardEntry::ranked(vec![first, second]);

        assert_eq!(entries[0].position, 1);
        assert_eq!(entries[0].uid, "b");
        assert_eq!(entries[1].position, 2);
    }

    #[test]
    fn limit_outside_bounds_is_rejected() {
        assert!(LeaderboardQuery { limit: Some(0) }.validate().is_err());
        assert!(LeaderboardQuery { limit: Some(101) }.validate().is_err());
        assert!(LeaderboardQuery { limit: None }.validate().is_ok());
    }
}
