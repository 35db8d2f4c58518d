use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::doc,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoProfileDocument, MongoScoreDocument, to_signed, uid_filter},
};
use crate::dao::{
    models::{BestScoreWrite, Difficulty, Identity, ProfileEntity, ScoreEntity},
    profile_store::ProfileStore,
    storage::StorageResult,
};

const PROFILE_COLLECTION_NAME: &str = "users";
const SCORE_COLLECTION_NAME: &str = "camblaster_scores";

/// [`ProfileStore`] backed by the `users` and score collections.
#[derive(Clone)]
pub struct MongoProfileStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoProfileStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let leaderboard_index = IndexModel::builder()
            .keys(doc! { "bestScore": -1, "_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("best_score_idx".to_owned()))
                    .build(),
            )
            .build();
        self.profiles()
            .await
            .create_index(leaderboard_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PROFILE_COLLECTION_NAME,
                index: "bestScore",
                source,
            })?;

        let score_index = IndexModel::builder()
            .keys(doc! { "difficulty": 1, "score": -1 })
            .options(
                IndexOptions::builder()
                    .name(Some("difficulty_score_idx".to_owned()))
                    .build(),
            )
            .build();
        self.scores()
            .await
            .create_index(score_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCORE_COLLECTION_NAME,
                index: "difficulty,score",
                source,
            })?;

        Ok(())
    }

    async fn profiles(&self) -> Collection<MongoProfileDocument> {
        self.inner
            .database
            .read()
            .await
            .collection::<MongoProfileDocument>(PROFILE_COLLECTION_NAME)
    }

    async fn scores(&self) -> Collection<MongoScoreDocument> {
        self.inner
            .database
            .read()
            .await
            .collection::<MongoScoreDocument>(SCORE_COLLECTION_NAME)
    }

    async fn upsert_profile(&self, identity: Identity) -> MongoResult<()> {
        let update = doc! {
            "$set": {
                "displayName": identity.resolved_display_name(),
                "photoURL": identity.resolved_photo_url(),
            },
            "$currentDate": { "lastSeen": true },
            "$setOnInsert": { "bestScore": 0_i64, "gamesPlayed": 0_i64 },
        };

        self.profiles()
            .await
            .update_one(uid_filter(&identity.uid), update)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpsertProfile {
                uid: identity.uid.clone(),
                source,
            })?;
        Ok(())
    }

    async fn find_profile(&self, uid: String) -> MongoResult<Option<ProfileEntity>> {
        let document = self
            .profiles()
            .await
            .find_one(uid_filter(&uid))
            .await
            .map_err(|source| MongoDaoError::LoadProfile { uid, source })?;
        Ok(document.map(Into::into))
    }

    /// `$max` applies the comparison server-side; the pre-image tells us what happened.
    async fn raise_best_score(&self, uid: String, candidate: u64) -> MongoResult<BestScoreWrite> {
        let before = self
            .profiles()
            .await
            .find_one_and_update(
                uid_filter(&uid),
                doc! { "$max": { "bestScore": to_signed(candidate) } },
            )
            .return_document(ReturnDocument::Before)
            .await
            .map_err(|source| MongoDaoError::UpdateProfile { uid, source })?;

        Ok(match before {
            None => BestScoreWrite::NoProfile,
            Some(document) if candidate > document.best_score() => BestScoreWrite::Raised {
                previous: document.best_score(),
            },
            Some(document) => BestScoreWrite::Kept {
                current: document.best_score(),
            },
        })
    }

    async fn increment_games_played(&self, uid: String) -> MongoResult<bool> {
        let result = self
            .profiles()
            .await
            .update_one(uid_filter(&uid), doc! { "$inc": { "gamesPlayed": 1_i64 } })
            .await
            .map_err(|source| MongoDaoError::UpdateProfile { uid, source })?;
        Ok(result.matched_count > 0)
    }

    async fn top_profiles(&self, limit: usize) -> MongoResult<Vec<ProfileEntity>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<MongoProfileDocument> = self
            .profiles()
            .await
            .find(doc! {})
            .sort(doc! { "bestScore": -1, "_id": 1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::QueryLeaderboard { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryLeaderboard { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn insert_score(&self, entry: ScoreEntity) -> MongoResult<()> {
        let id = entry.id;
        self.scores()
            .await
            .insert_one(MongoScoreDocument::from(entry))
            .await
            .map_err(|source| MongoDaoError::SaveScore { id, source })?;
        Ok(())
    }

    async fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> MongoResult<Vec<ScoreEntity>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_error = move |source: mongodb::error::Error| MongoDaoError::QueryScores {
            difficulty: difficulty.as_str(),
            source,
        };
        let documents: Vec<MongoScoreDocument> = self
            .scores()
            .await
            .find(doc! { "difficulty": difficulty.as_str() })
            .sort(doc! { "score": -1, "createdAt": 1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl ProfileStore for MongoProfileStore {
    fn upsert(&self, identity: &Identity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let identity = identity.clone();
        Box::pin(async move { store.upsert_profile(identity).await.map_err(Into::into) })
    }

    fn get(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move { store.find_profile(uid).await.map_err(Into::into) })
    }

    fn update_best_score(
        &self,
        uid: &str,
        candidate: u64,
    ) -> BoxFuture<'static, StorageResult<BestScoreWrite>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move {
            store
                .raise_best_score(uid, candidate)
                .await
                .map_err(Into::into)
        })
    }

    fn increment_games_played(&self, uid: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move {
            MongoProfileStore::increment_games_played(&store, uid)
                .await
                .map_err(Into::into)
        })
    }

    fn top_by_best_score(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.top_profiles(limit).await.map_err(Into::into) })
    }

    fn record_score(&self, entry: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_score(entry).await.map_err(Into::into) })
    }

    fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            MongoProfileStore::top_scores(&store, difficulty, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
