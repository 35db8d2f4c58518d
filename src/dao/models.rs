use std::{fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Display name used when the identity provider does not supply one.
pub const ANONYMOUS: &str = "Anonymous";

/// Identity handed over by the authentication collaborator on sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque, stable identifier assigned by the identity provider.
    pub uid: String,
    /// Display name, if the provider knows one.
    pub display_name: Option<String>,
    /// Avatar URL, if the provider knows one.
    pub photo_url: Option<String>,
}

impl Identity {
    /// Build an identity with only a uid.
    pub fn anonymous(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            photo_url: None,
        }
    }

    /// Display name as it must be persisted ("Anonymous" when absent or blank).
    pub fn resolved_display_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
            .to_owned()
    }

    /// Photo URL as it must be persisted (blank values are dropped).
    pub fn resolved_photo_url(&self) -> Option<String> {
        self.photo_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
    }
}

/// Durable record of a user's cumulative standing, owned by the remote store.
///
/// Field names follow the remote document layout so the cached JSON copy stays
/// readable next to the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntity {
    /// Identifier assigned by the identity provider.
    pub uid: String,
    /// Name shown on the leaderboard.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Optional avatar.
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Highest score ever reached; never decreases.
    #[serde(default)]
    pub best_score: u64,
    /// Number of completed games.
    #[serde(default)]
    pub games_played: u64,
    /// Last sign-in as recorded by the store.
    #[serde(default)]
    pub last_seen: Option<SystemTime>,
}

fn default_display_name() -> String {
    ANONYMOUS.to_owned()
}

impl ProfileEntity {
    /// Profile as created on first sign-in: zeroed counters, identity fields from the provider.
    pub fn fresh(identity: &Identity) -> Self {
        Self {
            uid: identity.uid.clone(),
            display_name: identity.resolved_display_name(),
            photo_url: identity.resolved_photo_url(),
            best_score: 0,
            games_played: 0,
            last_seen: None,
        }
    }

    /// Overwrite the mutable identity fields, leaving the counters untouched.
    pub fn apply_identity(&mut self, identity: &Identity) {
        self.display_name = identity.resolved_display_name();
        self.photo_url = identity.resolved_photo_url();
    }
}

/// Outcome of a conditional best-score write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestScoreWrite {
    /// The candidate was higher and has been stored.
    Raised {
        /// Value stored before the write.
        previous: u64,
    },
    /// The stored value was already greater or equal; nothing was written.
    Kept {
        /// Value currently stored.
        current: u64,
    },
    /// No profile document exists for the uid.
    NoProfile,
}

/// Difficulty selected before a round.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Slow bubbles, wide aim assist.
    Easy,
    /// Default pace.
    #[default]
    Medium,
    /// Fast bubbles.
    Hard,
}

impl Difficulty {
    /// Stable lowercase label used in document keys and queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown difficulty label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown difficulty `{0}`")]
pub struct UnknownDifficulty(pub String);

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(UnknownDifficulty(other.to_owned())),
        }
    }
}

/// One completed round appended to the score log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntity {
    /// Primary key of the entry.
    pub id: Uuid,
    /// Uid of the player.
    pub user_id: String,
    /// Display name at the time of the round.
    pub user_name: String,
    /// Avatar at the time of the round.
    pub photo_url: Option<String>,
    /// Final score of the round.
    pub score: u64,
    /// Difficulty the round was played on.
    pub difficulty: Difficulty,
    /// When the entry was recorded.
    pub created_at: SystemTime,
}

impl ScoreEntity {
    /// Build a new log entry for `profile`, stamped now.
    pub fn new(profile: &ProfileEntity, score: u64, difficulty: Difficulty) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: profile.uid.clone(),
            user_name: profile.display_name.clone(),
            photo_url: profile.photo_url.clone(),
            score,
            difficulty,
            created_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_fields_fall_back() {
        let identity = Identity {
            uid: "u1".into(),
            display_name: Some("   ".into()),
            photo_url: Some(String::new()),
        };

        assert_eq!(identity.resolved_display_name(), ANONYMOUS);
        assert_eq!(identity.resolved_photo_url(), None);
    }

    #[test]
    fn cached_profile_uses_document_field_names() {
        let mut profile = ProfileEntity::fresh(&Identity::anonymous("u1"));
        profile.best_score = 900;

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["bestScore"], 900);
        assert_eq!(json["displayName"], "Anonymous");
        assert!(json.get("photoURL").is_some());
    }

    #[test]
    fn partial_cached_profile_is_completed_with_defaults() {
        let profile: ProfileEntity =
            serde_json::from_str(r#"{"uid":"u1","bestScore":12}"#).unwrap();

        assert_eq!(profile.display_name, ANONYMOUS);
        assert_eq!(profile.best_score, 12);
        assert_eq!(profile.games_played, 0);
    }

    #[test]
    fn difficulty_round_trips_through_labels() {
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(difficulty.as_str().parse::<Difficulty>(), Ok(difficulty));
        }
        assert!("nightmare".parse::<Difficulty>().is_err());
    }
}
