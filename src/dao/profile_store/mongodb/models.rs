use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{Difficulty, Identity, ProfileEntity, ScoreEntity};

/// Document stored in the `users` collection, keyed by uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoProfileDocument {
    #[serde(rename = "_id")]
    uid: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    photo_url: Option<String>,
    #[serde(default)]
    best_score: i64,
    #[serde(default)]
    games_played: i64,
    #[serde(default)]
    last_seen: Option<DateTime>,
}

impl MongoProfileDocument {
    pub fn best_score(&self) -> u64 {
        to_unsigned(self.best_score)
    }
}

impl From<MongoProfileDocument> for ProfileEntity {
    fn from(value: MongoProfileDocument) -> Self {
        let mut entity = ProfileEntity::fresh(&Identity {
            uid: value.uid,
            display_name: value.display_name,
            photo_url: value.photo_url,
        });
        entity.best_score = to_unsigned(value.best_score);
        entity.games_played = to_unsigned(value.games_played);
        entity.last_seen = value.last_seen.map(DateTime::to_system_time);
        entity
    }
}

/// Document stored in the `camblaster_scores` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoScoreDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    user_id: String,
    user_name: String,
    #[serde(default, rename = "photoURL")]
    photo_url: Option<String>,
    score: i64,
    difficulty: Difficulty,
    created_at: DateTime,
}

impl From<ScoreEntity> for MongoScoreDocument {
    fn from(value: ScoreEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            user_name: value.user_name,
            photo_url: value.photo_url,
            score: to_signed(value.score),
            difficulty: value.difficulty,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoScoreDocument> for ScoreEntity {
    fn from(value: MongoScoreDocument) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            user_name: value.user_name,
            photo_url: value.photo_url,
            score: to_unsigned(value.score),
            difficulty: value.difficulty,
            created_at: value.created_at.to_system_time(),
        }
    }
}

pub fn uid_filter(uid: &str) -> Document {
    doc! { "_id": uid }
}

/// BSON has no unsigned integers; counters are stored as `i64`.
pub fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_unsigned(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counters_read_back_as_zero() {
        let document: MongoProfileDocument = mongodb::bson::deserialize_from_document(doc! {
            "_id": "u1",
            "displayName": "Ada",
            "bestScore": -5_i64,
            "gamesPlayed": 3_i64,
        })
        .unwrap();

        let entity = ProfileEntity::from(document);
        assert_eq!(entity.best_score, 0);
        assert_eq!(entity.games_played, 3);
        assert_eq!(entity.photo_url, None);
    }

    #[test]
    fn score_entries_keep_the_difficulty_label() {
        let player = ProfileEntity::fresh(&Identity::anonymous("u1"));
        let document = MongoScoreDocument::from(ScoreEntity::new(&player, 42, Difficulty::Hard));

        let raw = mongodb::bson::serialize_to_document(&document).unwrap();
        assert_eq!(raw.get_str("difficulty").unwrap(), "hard");
        assert_eq!(raw.get_i64("score").unwrap(), 42);
        assert_eq!(raw.get_str("userId").unwrap(), "u1");
    }
}
