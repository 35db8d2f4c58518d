use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{Difficulty, ProfileEntity, ScoreEntity};

pub const PROFILE_PREFIX: &str = "user::";
pub const SCORE_PREFIX: &str = "score::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Profile stored as `user::{uid}`; the body mirrors the `users` document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileEntity,
}

impl CouchProfileDocument {
    pub fn new(profile: ProfileEntity) -> Self {
        Self {
            id: profile_doc_id(&profile.uid),
            rev: None,
            profile,
        }
    }
}

/// Score log entry stored as `score::{difficulty}::{id}` so one prefix scan covers a difficulty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchScoreDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: ScoreBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub entry_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    pub score: u64,
    pub difficulty: Difficulty,
    pub created_at: SystemTime,
}

impl From<ScoreEntity> for CouchScoreDocument {
    fn from(value: ScoreEntity) -> Self {
        Self {
            id: score_doc_id(value.difficulty, value.id),
            rev: None,
            body: ScoreBody {
                entry_id: value.id,
                user_id: value.user_id,
                user_name: value.user_name,
                photo_url: value.photo_url,
                score: value.score,
                difficulty: value.difficulty,
                created_at: value.created_at,
            },
        }
    }
}

impl From<CouchScoreDocument> for ScoreEntity {
    fn from(value: CouchScoreDocument) -> Self {
        let body = value.body;
        Self {
            id: body.entry_id,
            user_id: body.user_id,
            user_name: body.user_name,
            photo_url: body.photo_url,
            score: body.score,
            difficulty: body.difficulty,
            created_at: body.created_at,
        }
    }
}

pub fn profile_doc_id(uid: &str) -> String {
    format!("{PROFILE_PREFIX}{uid}")
}

pub fn score_prefix(difficulty: Difficulty) -> String {
    format!("{SCORE_PREFIX}{difficulty}::")
}

pub fn score_doc_id(difficulty: Difficulty, id: Uuid) -> String {
    format!("{}{id}", score_prefix(difficulty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::Identity;

    #[test]
    fn profile_document_flattens_profile_fields() {
        let mut profile = ProfileEntity::fresh(&Identity::anonymous("u1"));
        profile.best_score = 450;

        let mut document = CouchProfileDocument::new(profile);
        document.rev = Some("3-abc".into());
        let json = serde_json::to_value(&document).unwrap();

        assert_eq!(json["_id"], "user::u1");
        assert_eq!(json["_rev"], "3-abc");
        assert_eq!(json["bestScore"], 450);
        assert_eq!(json["uid"], "u1");
    }

    #[test]
    fn score_ids_group_by_difficulty() {
        let id = Uuid::nil();
        assert_eq!(
            score_doc_id(Difficulty::Hard, id),
            format!("score::hard::{id}")
        );
        assert!(score_doc_id(Difficulty::Easy, id).starts_with(&score_prefix(Difficulty::Easy)));
    }
}
