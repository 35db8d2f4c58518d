//! Merges remote and local profile state at sign-in and on score events.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
    cache::LocalCache,
    dao::{
        models::{BestScoreWrite, Difficulty, Identity, ProfileEntity, ScoreEntity},
        profile_store::ProfileStore,
    },
    services::bounded::{Raced, race},
};

/// Shared count of background store writes that have not finished yet.
///
/// Readable without access to the reconciler that owns the writes.
#[derive(Debug, Clone, Default)]
pub struct PendingWrites(Arc<AtomicUsize>);

impl PendingWrites {
    /// Writes spawned and not yet finished.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn track(&self) -> PendingGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        PendingGuard(self.0.clone())
    }
}

/// Decrements on drop so panicked and cancelled writes are released too.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Where the working profile of a sign-in came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoginSource {
    /// The remote store answered in time.
    Remote,
    /// The cached copy of this user's profile.
    Cache,
    /// Only the pre-profile scalar best score was available.
    Legacy,
    /// Nothing was known; a zeroed profile.
    Default,
}

/// Working profile adopted at sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Profile the client works with until the next sign-in.
    pub profile: ProfileEntity,
    /// Which step of the fallback chain produced `profile`.
    pub source: LoginSource,
}

/// Sole mediator between the remote [`ProfileStore`] and the [`LocalCache`].
///
/// Remote writes are fire-and-forget: they are spawned into an owned
/// [`JoinSet`] and only awaited by [`ScoreReconciler::settle`].
pub struct ScoreReconciler {
    store: Arc<dyn ProfileStore>,
    cache: LocalCache,
    login_timeout: Duration,
    background: JoinSet<()>,
    pending: PendingWrites,
}

impl ScoreReconciler {
    /// `login_timeout` bounds how long [`ScoreReconciler::login`] waits for `store`.
    pub fn new(store: Arc<dyn ProfileStore>, cache: LocalCache, login_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            login_timeout,
            background: JoinSet::new(),
            pending: PendingWrites::default(),
        }
    }

    /// Local mirror shared with the controller for the tutorial and mute flags.
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Resolve the working profile for `identity`, waiting at most the login timeout.
    ///
    /// The remote upsert and read run as one detached task; if it loses the race
    /// its result is dropped and the fallback chain is used instead.
    pub async fn login(&mut self, identity: &Identity) -> LoginOutcome {
        self.reap();

        let store = self.store.clone();
        let remote_identity = identity.clone();
        let fetch = async move {
            store.upsert(&remote_identity).await?;
            store.get(&remote_identity.uid).await
        };

        let uid = identity.uid.as_str();
        match race(self.login_timeout, fetch).await {
            Raced::Completed(Ok(Some(remote))) => return self.adopt_remote(remote),
            Raced::Completed(Ok(None)) => {
                warn!(uid, "profile missing right after upsert; using local fallback")
            }
            Raced::Completed(Err(err)) => {
                warn!(uid, error = %err, "profile fetch failed; using local fallback")
            }
            Raced::TimedOut => warn!(
                uid,
                timeout_ms = self.login_timeout.as_millis() as u64,
                "profile fetch timed out; using local fallback"
            ),
            Raced::Aborted => warn!(uid, "profile fetch aborted; using local fallback"),
        }

        self.local_fallback(identity)
    }

    fn adopt_remote(&mut self, mut profile: ProfileEntity) -> LoginOutcome {
        let cached_best = self
            .cache
            .get_profile(&profile.uid)
            .map(|cached| cached.best_score)
            .unwrap_or(0);

        // an improvement that never reached the store survives in the cache
        if cached_best > profile.best_score {
            info!(
                uid = %profile.uid,
                remote = profile.best_score,
                cached = cached_best,
                "pushing cached best score the store never received"
            );
            profile.best_score = cached_best;
            self.push_best_score(profile.uid.clone(), cached_best);
        }

        self.cache.set_profile(&profile.uid, &profile);
        LoginOutcome {
            profile,
            source: LoginSource::Remote,
        }
    }

    fn local_fallback(&self, identity: &Identity) -> LoginOutcome {
        if let Some(mut cached) = self.cache.get_profile(&identity.uid) {
            cached.apply_identity(identity);
            return LoginOutcome {
                profile: cached,
                source: LoginSource::Cache,
            };
        }

        let mut profile = ProfileEntity::fresh(identity);
        match self.cache.legacy_best_score() {
            Some(best) => {
                profile.best_score = best;
                LoginOutcome {
                    profile,
                    source: LoginSource::Legacy,
                }
            }
            None => LoginOutcome {
                profile,
                source: LoginSource::Default,
            },
        }
    }

    /// Offer `candidate` as a new best for `profile`.
    ///
    /// On improvement the in-memory profile and the cache are updated before
    /// returning, and the remote write is spawned. Returns whether it improved.
    pub fn offer(&mut self, profile: &mut ProfileEntity, candidate: u64) -> bool {
        if candidate <= profile.best_score {
            return false;
        }

        profile.best_score = candidate;
        self.cache.set_profile(&profile.uid, profile);
        self.push_best_score(profile.uid.clone(), candidate);
        true
    }

    fn push_best_score(&mut self, uid: String, candidate: u64) {
        let store = self.store.clone();
        let cache = self.cache.clone();
        self.spawn(async move {
            match store.update_best_score(&uid, candidate).await {
                Ok(BestScoreWrite::Raised { previous }) => {
                    debug!(uid = %uid, previous, candidate, "remote best score raised")
                }
                Ok(BestScoreWrite::Kept { current }) => {
                    debug!(uid = %uid, current, candidate, "remote best score already higher")
                }
                Ok(BestScoreWrite::NoProfile) => {
                    warn!(uid = %uid, candidate, "no remote profile for best score");
                    cache.set_legacy_best_score(candidate);
                }
                Err(err) => {
                    warn!(uid = %uid, candidate, error = %err, "failed to push best score");
                    cache.set_legacy_best_score(candidate);
                }
            }
        });
    }

    /// Add one completed game to the remote counter without waiting for it.
    pub fn count_game(&mut self, uid: &str) {
        let store = self.store.clone();
        let uid = uid.to_owned();
        self.spawn(async move {
            match store.increment_games_played(&uid).await {
                Ok(true) => debug!(uid = %uid, "games played incremented"),
                Ok(false) => warn!(uid = %uid, "no remote profile to count the game on"),
                Err(err) => warn!(uid = %uid, error = %err, "failed to increment games played"),
            }
        });
    }

    /// Append a score log entry without waiting for it.
    pub fn record_score(&mut self, profile: &ProfileEntity, score: u64, difficulty: Difficulty) {
        let store = self.store.clone();
        let entry = ScoreEntity::new(profile, score, difficulty);
        self.spawn(async move {
            let id = entry.id;
            if let Err(err) = store.record_score(entry).await {
                warn!(%id, error = %err, "failed to save score entry");
            }
        });
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.reap();
        let guard = self.pending.track();
        self.background.spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    /// Drop bookkeeping for writes that already finished.
    fn reap(&mut self) {
        while let Some(result) = self.background.try_join_next() {
            if let Err(err) = result {
                warn!(error = %err, "background store write panicked");
            }
        }
    }

    /// Handle on the number of background writes still running.
    pub fn pending_writes(&self) -> PendingWrites {
        self.pending.clone()
    }

    /// Wait for every outstanding background write.
    pub async fn settle(&mut self) {
        while let Some(result) = self.background.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "background store write panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::dao::profile_store::MemoryProfileStore;

    const TIMEOUT: Duration = Duration::from_millis(3_000);

    fn ada() -> Identity {
        Identity {
            uid: "u1".into(),
            display_name: Some("Ada".into()),
            photo_url: None,
        }
    }

    fn reconciler(store: &MemoryProfileStore, cache: &LocalCache) -> ScoreReconciler {
        ScoreReconciler::new(Arc::new(store.clone()), cache.clone(), TIMEOUT)
    }

    #[tokio::test]
    async fn first_login_creates_a_zeroed_remote_profile() {
        let store = MemoryProfileStore::new();
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);

        let outcome = reconciler.login(&ada()).await;

        assert_eq!(outcome.source, LoginSource::Remote);
        assert_eq!(outcome.profile.best_score, 0);
        assert_eq!(outcome.profile.games_played, 0);
        assert_eq!(cache.get_profile("u1"), Some(outcome.profile));
    }

    #[tokio::test]
    async fn improvements_reach_the_store_and_lower_scores_do_not() {
        let store = MemoryProfileStore::new();
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);
        let mut profile = reconciler.login(&ada()).await.profile;

        assert!(reconciler.offer(&mut profile, 450));
        assert!(!reconciler.offer(&mut profile, 300));
        reconciler.settle().await;

        assert_eq!(profile.best_score, 450);
        assert_eq!(store.get("u1").await.unwrap().unwrap().best_score, 450);
        assert_eq!(cache.get_profile("u1").unwrap().best_score, 450);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_store_falls_back_to_cache_after_timeout() {
        let store = MemoryProfileStore::new();
        store.set_latency(Duration::from_secs(3_600));
        let cache = LocalCache::in_memory();
        let mut cached = ProfileEntity::fresh(&ada());
        cached.best_score = 900;
        cache.set_profile("u1", &cached);
        let mut reconciler = reconciler(&store, &cache);

        let started = Instant::now();
        let outcome = reconciler.login(&ada()).await;

        assert_eq!(outcome.source, LoginSource::Cache);
        assert_eq!(outcome.profile.best_score, 900);
        assert!(started.elapsed() >= TIMEOUT);
        assert!(started.elapsed() < TIMEOUT + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_answer_before_timeout_is_used_immediately() {
        let store = MemoryProfileStore::new();
        store.set_latency(Duration::from_millis(200));
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);

        let started = Instant::now();
        let outcome = reconciler.login(&ada()).await;

        assert_eq!(outcome.source, LoginSource::Remote);
        assert!(started.elapsed() < TIMEOUT);
    }

    #[tokio::test]
    async fn offline_store_without_cache_uses_legacy_then_default() {
        let store = MemoryProfileStore::new();
        store.set_offline(true);
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);

        let outcome = reconciler.login(&ada()).await;
        assert_eq!(outcome.source, LoginSource::Default);
        assert_eq!(outcome.profile.best_score, 0);
        assert_eq!(outcome.profile.display_name, "Ada");

        cache.set_legacy_best_score(120);
        let outcome = reconciler.login(&ada()).await;
        assert_eq!(outcome.source, LoginSource::Legacy);
        assert_eq!(outcome.profile.best_score, 120);
    }

    #[tokio::test]
    async fn failed_push_keeps_the_improvement_locally() {
        let store = MemoryProfileStore::new();
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);
        let mut profile = reconciler.login(&ada()).await.profile;

        store.set_offline(true);
        assert!(reconciler.offer(&mut profile, 700));
        reconciler.settle().await;

        assert_eq!(cache.get_profile("u1").unwrap().best_score, 700);
        assert_eq!(cache.legacy_best_score(), Some(700));

        store.set_offline(false);
        let outcome = reconciler.login(&ada()).await;
        reconciler.settle().await;

        assert_eq!(outcome.source, LoginSource::Remote);
        assert_eq!(outcome.profile.best_score, 700);
        assert_eq!(store.get("u1").await.unwrap().unwrap().best_score, 700);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_count_follows_background_writes() {
        let store = MemoryProfileStore::new();
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);
        reconciler.login(&ada()).await;
        let pending = reconciler.pending_writes();

        store.set_latency(Duration::from_secs(1));
        reconciler.count_game("u1");
        reconciler.count_game("u1");
        assert_eq!(pending.get(), 2);

        reconciler.settle().await;
        assert_eq!(pending.get(), 0);
    }

    #[tokio::test]
    async fn count_game_and_record_score_are_fire_and_forget() {
        let store = MemoryProfileStore::new();
        let cache = LocalCache::in_memory();
        let mut reconciler = reconciler(&store, &cache);
        let profile = reconciler.login(&ada()).await.profile;

        reconciler.count_game("u1");
        reconciler.record_score(&profile, 42, Difficulty::Hard);
        reconciler.settle().await;

        assert_eq!(reconciler.pending_writes().get(), 0);
        assert_eq!(store.get("u1").await.unwrap().unwrap().games_played, 1);
        let scores = store.scores().await;
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 42);
        assert_eq!(scores[0].difficulty, Difficulty::Hard);
    }
}
