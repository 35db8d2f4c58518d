use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

use crate::{
    dao::models::{Difficulty, Identity},
    dto::{
        leaderboard::{LeaderboardEntry, ScoreEntry},
        validation::validate_uid,
    },
    services::{leaderboard_service::Rank, reconciler::LoginSource},
    state::{
        session::{ControllerSnapshot, GameOverSummary, Player, ScoreReport, Session},
        state_machine::SessionPhase,
    },
};

const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Identity forwarded by the authentication collaborator after a provider sign-in.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignInRequest {
    /// Provider uid; becomes the profile key.
    pub uid: String,
    /// Provider display name; blank falls back to a placeholder.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Provider avatar URL.
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Validate for SignInRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_uid(&self.uid) {
            errors.add("uid", e);
        }

        if let Some(name) = &self.display_name
            && name.chars().count() > MAX_DISPLAY_NAME_LEN
        {
            let mut err = ValidationError::new("display_name_length");
            err.message =
                Some(format!("display_name must be at most {MAX_DISPLAY_NAME_LEN} characters").into());
            errors.add("display_name", err);
        }

        // blank photo urls are dropped later, only check real ones
        if let Some(url) = self.photo_url.as_deref().map(str::trim)
            && !url.is_empty()
            && !url.validate_url()
        {
            errors.add("photo_url", ValidationError::new("url"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<SignInRequest> for Identity {
    fn from(request: SignInRequest) -> Self {
        Identity {
            uid: request.uid,
            display_name: request.display_name,
            photo_url: request.photo_url,
        }
    }
}

/// Leave the welcome screen.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BeginRequest {
    /// Difficulty of the round about to start.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Go straight to the round even if the tutorial was never shown.
    #[serde(default)]
    pub skip_tutorial: bool,
}

/// Running total of the current round.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScoreRequest {
    /// Score so far; lower totals than an earlier report are ignored.
    pub score: u64,
}

/// End of the current round.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GameOverRequest {
    /// Final score; the last reported total is used when omitted.
    #[serde(default)]
    pub score: Option<u64>,
}

/// Signed-in user and the profile the client works with.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerView {
    /// Provider uid.
    pub uid: String,
    /// Name shown in the client.
    pub display_name: String,
    /// Avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Best score of the working profile.
    pub best_score: u64,
    /// Completed rounds known locally.
    pub games_played: u64,
    /// Where the working profile came from at sign-in.
    pub source: LoginSource,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            uid: player.profile.uid.clone(),
            display_name: player.profile.display_name.clone(),
            photo_url: player.profile.photo_url.clone(),
            best_score: player.profile.best_score,
            games_played: player.profile.games_played,
            source: player.source,
        }
    }
}

/// Round currently shown on the playing or game-over screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundView {
    /// Round id.
    pub id: Uuid,
    /// Difficulty chosen on the welcome screen.
    pub difficulty: Difficulty,
    /// Highest total reported in this round.
    pub current_score: u64,
    /// Best score when the round started.
    pub best_at_start: u64,
    /// Filled once the round has ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<GameOverResponse>,
}

impl From<&Session> for RoundView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            difficulty: session.difficulty,
            current_score: session.current_score,
            best_at_start: session.best_at_start,
            summary: session.summary.clone().map(GameOverResponse::from),
        }
    }
}

/// Snapshot of the client session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    /// Current screen.
    pub phase: SessionPhase,
    /// Number of transitions applied so far.
    pub version: usize,
    /// Signed-in player, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerView>,
    /// Last chosen difficulty.
    pub difficulty: Difficulty,
    /// Round on screen while playing or on game over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundView>,
    /// Whether the next begin skips the tutorial.
    pub tutorial_seen: bool,
    /// Persisted mute preference.
    pub muted: bool,
}

impl From<&ControllerSnapshot> for SessionView {
    fn from(snapshot: &ControllerSnapshot) -> Self {
        Self {
            phase: snapshot.machine.phase,
            version: snapshot.machine.version,
            player: snapshot.player.as_ref().map(PlayerView::from),
            difficulty: snapshot.difficulty,
            round: snapshot.session.as_ref().map(RoundView::from),
            tutorial_seen: snapshot.tutorial_seen,
            muted: snapshot.muted,
        }
    }
}

/// Acknowledgement of a score report.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreReportResponse {
    /// Highest total of the round so far.
    pub current_score: u64,
    /// Best score after the report.
    pub best_score: u64,
    /// The report beat the previous best.
    pub improved: bool,
}

impl From<ScoreReport> for ScoreReportResponse {
    fn from(report: ScoreReport) -> Self {
        Self {
            current_score: report.current_score,
            best_score: report.best_score,
            improved: report.improved,
        }
    }
}

/// Everything the game-over screen displays.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameOverResponse {
    /// Final score of the round.
    pub score: u64,
    /// Best score after the round.
    pub best_score: u64,
    /// The round beat the best score it started with.
    pub is_new_best: bool,
    /// Difficulty of the round.
    pub difficulty: Difficulty,
    /// Place in `leaderboard`, unknown outside the window.
    pub rank: Rank,
    /// Best-score leaderboard window.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Best rounds at this difficulty.
    pub difficulty_leaderboard: Vec<ScoreEntry>,
}

impl From<GameOverSummary> for GameOverResponse {
    fn from(summary: GameOverSummary) -> Self {
        Self {
            score: summary.score,
            best_score: summary.best_score,
            is_new_best: summary.is_new_best,
            difficulty: summary.difficulty,
            rank: summary.rank,
            leaderboard: LeaderboardEntry::ranked(summary.leaderboard),
            difficulty_leaderboard: summary
                .difficulty_leaderboard
                .into_iter()
                .map(ScoreEntry::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uid: &str, name: Option<&str>, photo: Option<&str>) -> SignInRequest {
        SignInRequest {
            uid: uid.into(),
            display_name: name.map(Into::into),
            photo_url: photo.map(Into::into),
        }
    }

    #[test]
    fn well_formed_identity_passes() {
        let req = request("u1", Some("Ada"), Some("https://example.com/ada.png"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn blank_photo_url_is_tolerated() {
        assert!(request("u1", None, Some("  ")).validate().is_ok());
    }

    #[test]
    fn each_bad_field_is_reported() {
        let long_name = "x".repeat(65);
        let errors = request("", Some(long_name.as_str()), Some("not a url"))
            .validate()
            .unwrap_err();

        let fields = errors.field_errors();
        assert!(fields.contains_key("uid"));
        assert!(fields.contains_key("display_name"));
        assert!(fields.contains_key("photo_url"));
    }

    #[test]
    fn begin_defaults_to_medium_with_tutorial() {
        let begin: BeginRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(begin.difficulty, Difficulty::Medium);
        assert!(!begin.skip_tutorial);
    }
}
