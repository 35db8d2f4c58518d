//! In-process backend used for offline play and as the reference implementation in tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::{sync::RwLock, time::sleep};

use super::ProfileStore;
use crate::dao::{
    models::{BestScoreWrite, Difficulty, Identity, ProfileEntity, ScoreEntity},
    storage::{StorageError, StorageResult},
};

/// Profiles kept in insertion order, which doubles as the store-native tie order.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    profiles: RwLock<IndexMap<String, ProfileEntity>>,
    scores: RwLock<Vec<ScoreEntity>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryProfileStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.latency_ms.store(millis, Ordering::Relaxed);
    }

    /// Make every subsequent call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::Relaxed);
    }

    /// Seed a profile directly, bypassing the upsert rules.
    pub async fn insert(&self, profile: ProfileEntity) {
        let mut guard = self.inner.profiles.write().await;
        guard.insert(profile.uid.clone(), profile);
    }

    /// Every score log entry recorded so far, oldest first.
    pub async fn scores(&self) -> Vec<ScoreEntity> {
        self.inner.scores.read().await.clone()
    }

    /// Simulate the round trip: wait out the latency, then check reachability.
    async fn round_trip(&self, operation: &'static str) -> StorageResult<()> {
        let latency = self.inner.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }

        if self.inner.offline.load(Ordering::Relaxed) {
            return Err(StorageError::unavailable(
                format!("in-memory store offline during {operation}"),
                io::Error::new(io::ErrorKind::NotConnected, "store offline"),
            ));
        }

        Ok(())
    }

    async fn write_identity(&self, identity: Identity) -> StorageResult<()> {
        self.round_trip("upsert").await?;
        let mut guard = self.inner.profiles.write().await;
        guard
            .entry(identity.uid.clone())
            .and_modify(|profile| profile.apply_identity(&identity))
            .or_insert_with(|| ProfileEntity::fresh(&identity))
            .last_seen = Some(SystemTime::now());
        Ok(())
    }

    async fn load(&self, uid: String) -> StorageResult<Option<ProfileEntity>> {
        self.round_trip("get").await?;
        Ok(self.inner.profiles.read().await.get(&uid).cloned())
    }

    async fn raise_best_score(
        &self,
        uid: String,
        candidate: u64,
    ) -> StorageResult<BestScoreWrite> {
        self.round_trip("update_best_score").await?;
        let mut guard = self.inner.profiles.write().await;
        let Some(profile) = guard.get_mut(&uid) else {
            return Ok(BestScoreWrite::NoProfile);
        };

        if candidate > profile.best_score {
            let previous = profile.best_score;
            profile.best_score = candidate;
            Ok(BestScoreWrite::Raised { previous })
        } else {
            Ok(BestScoreWrite::Kept {
                current: profile.best_score,
            })
        }
    }

    async fn bump_games_played(&self, uid: String) -> StorageResult<bool> {
        self.round_trip("increment_games_played").await?;
        let mut guard = self.inner.profiles.write().await;
        match guard.get_mut(&uid) {
            Some(profile) => {
                profile.games_played += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ranked_profiles(&self, limit: usize) -> StorageResult<Vec<ProfileEntity>> {
        self.round_trip("top_by_best_score").await?;
        let mut profiles: Vec<ProfileEntity> =
            self.inner.profiles.read().await.values().cloned().collect();
        // stable sort keeps insertion order among equal scores
        profiles.sort_by(|a, b| b.best_score.cmp(&a.best_score));
        profiles.truncate(limit);
        Ok(profiles)
    }

    async fn append_score(&self, entry: ScoreEntity) -> StorageResult<()> {
        self.round_trip("record_score").await?;
        self.inner.scores.write().await.push(entry);
        Ok(())
    }

    async fn ranked_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> StorageResult<Vec<ScoreEntity>> {
        self.round_trip("top_scores").await?;
        let mut entries: Vec<ScoreEntity> = self
            .inner
            .scores
            .read()
            .await
            .iter()
            .filter(|entry| entry.difficulty == difficulty)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(limit);
        Ok(entries)
    }
}

impl ProfileStore for MemoryProfileStore {
    fn upsert(&self, identity: &Identity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let identity = identity.clone();
        Box::pin(async move { store.write_identity(identity).await })
    }

    fn get(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move { store.load(uid).await })
    }

    fn update_best_score(
        &self,
        uid: &str,
        candidate: u64,
    ) -> BoxFuture<'static, StorageResult<BestScoreWrite>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move { store.raise_best_score(uid, candidate).await })
    }

    fn increment_games_played(&self, uid: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move { store.bump_games_played(uid).await })
    }

    fn top_by_best_score(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.ranked_profiles(limit).await })
    }

    fn record_score(&self, entry: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_score(entry).await })
    }

    fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.ranked_scores(difficulty, limit).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.round_trip("health_check").await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.round_trip("reconnect").await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uid: &str, name: &str) -> Identity {
        Identity {
            uid: uid.into(),
            display_name: Some(name.into()),
            photo_url: None,
        }
    }

    async fn profile(store: &MemoryProfileStore, uid: &str) -> ProfileEntity {
        store.get(uid).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn upsert_creates_zeroed_profile() {
        let store = MemoryProfileStore::new();
        store.upsert(&identity("u1", "Ada")).await.unwrap();

        let created = profile(&store, "u1").await;
        assert_eq!(created.display_name, "Ada");
        assert_eq!(created.best_score, 0);
        assert_eq!(created.games_played, 0);
        assert!(created.last_seen.is_some());
    }

    #[tokio::test]
    async fn repeated_upsert_only_touches_identity_and_last_seen() {
        let store = MemoryProfileStore::new();
        let ada = identity("u1", "Ada");
        store.upsert(&ada).await.unwrap();
        store.update_best_score("u1", 450).await.unwrap();
        store.increment_games_played("u1").await.unwrap();
        let before = profile(&store, "u1").await;

        store.upsert(&ada).await.unwrap();
        let after = profile(&store, "u1").await;

        assert_eq!(
            ProfileEntity {
                last_seen: None,
                ..before
            },
            ProfileEntity {
                last_seen: None,
                ..after
            }
        );

        store.upsert(&identity("u1", "Ada L.")).await.unwrap();
        let renamed = profile(&store, "u1").await;
        assert_eq!(renamed.display_name, "Ada L.");
        assert_eq!(renamed.best_score, 450);
        assert_eq!(renamed.games_played, 1);
    }

    #[tokio::test]
    async fn best_score_is_the_running_maximum() {
        let store = MemoryProfileStore::new();
        store.upsert(&identity("u1", "Ada")).await.unwrap();

        let submitted = [120, 80, 450, 450, 300, 451, 10];
        for candidate in submitted {
            store.update_best_score("u1", candidate).await.unwrap();
        }

        assert_eq!(profile(&store, "u1").await.best_score, 451);
    }

    #[tokio::test]
    async fn best_score_write_reports_what_happened() {
        let store = MemoryProfileStore::new();
        store.upsert(&identity("u1", "Ada")).await.unwrap();

        assert_eq!(
            store.update_best_score("u1", 450).await.unwrap(),
            BestScoreWrite::Raised { previous: 0 }
        );
        assert_eq!(
            store.update_best_score("u1", 300).await.unwrap(),
            BestScoreWrite::Kept { current: 450 }
        );
        assert_eq!(
            store.update_best_score("ghost", 300).await.unwrap(),
            BestScoreWrite::NoProfile
        );
    }

    #[tokio::test]
    async fn concurrent_improvements_never_lower_the_best() {
        let store = MemoryProfileStore::new();
        store.upsert(&identity("u1", "Ada")).await.unwrap();

        let writes = (1..=50u64).rev().map(|candidate| {
            let store = store.clone();
            tokio::spawn(async move { store.update_best_score("u1", candidate * 10).await })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap().unwrap();
        }

        assert_eq!(profile(&store, "u1").await.best_score, 500);
    }

    #[tokio::test]
    async fn top_by_best_score_keeps_insertion_order_on_ties() {
        let store = MemoryProfileStore::new();
        for (uid, best) in [("a", 10), ("b", 30), ("c", 10), ("d", 20)] {
            let mut entry = ProfileEntity::fresh(&Identity::anonymous(uid));
            entry.best_score = best;
            store.insert(entry).await;
        }

        let top = store.top_by_best_score(3).await.unwrap();
        let order: Vec<&str> = top.iter().map(|p| p.uid.as_str()).collect();
        assert_eq!(order, ["b", "d", "a"]);
    }

    #[tokio::test]
    async fn top_scores_filters_by_difficulty() {
        let store = MemoryProfileStore::new();
        let player = ProfileEntity::fresh(&Identity::anonymous("u1"));
        for (score, difficulty) in [
            (100, Difficulty::Easy),
            (300, Difficulty::Hard),
            (200, Difficulty::Easy),
        ] {
            store
                .record_score(ScoreEntity::new(&player, score, difficulty))
                .await
                .unwrap();
        }

        let easy = store.top_scores(Difficulty::Easy, 10).await.unwrap();
        let scores: Vec<u64> = easy.iter().map(|entry| entry.score).collect();
        assert_eq!(scores, [200, 100]);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryProfileStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.get("u1").await,
            Err(StorageError::Unavailable { .. })
        ));
    }
}
