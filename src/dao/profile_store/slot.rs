use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, watch};

use super::ProfileStore;
use crate::dao::{
    models::{BestScoreWrite, Difficulty, Identity, ProfileEntity, ScoreEntity},
    storage::{StorageError, StorageResult},
};

/// Swappable holder for the active backend.
///
/// The supervisor installs and clears backends at runtime; everything else sees
/// a single [`ProfileStore`] that fails fast with [`StorageError::Degraded`]
/// while nothing is installed.
#[derive(Clone)]
pub struct StoreSlot {
    inner: Arc<SlotInner>,
}

struct SlotInner {
    current: RwLock<Option<Arc<dyn ProfileStore>>>,
    degraded: watch::Sender<bool>,
}

impl StoreSlot {
    /// Create an empty slot. The slot starts in degraded mode.
    pub fn new() -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            inner: Arc::new(SlotInner {
                current: RwLock::new(None),
                degraded,
            }),
        }
    }

    /// Obtain a handle to the installed backend, if any.
    pub async fn current(&self) -> Option<Arc<dyn ProfileStore>> {
        self.inner.current.read().await.as_ref().cloned()
    }

    /// Install a backend and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn ProfileStore>) {
        {
            let mut guard = self.inner.current.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the backend and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.inner.current.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.inner.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.inner.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn set_degraded(&self, value: bool) {
        self.inner.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    fn delegate<T, F>(&self, call: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn ProfileStore>) -> BoxFuture<'static, StorageResult<T>> + Send + 'static,
    {
        let slot = self.clone();
        Box::pin(async move {
            match slot.current().await {
                Some(store) => call(store).await,
                None => Err(StorageError::Degraded),
            }
        })
    }
}

impl Default for StoreSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for StoreSlot {
    fn upsert(&self, identity: &Identity) -> BoxFuture<'static, StorageResult<()>> {
        let identity = identity.clone();
        self.delegate(move |store| store.upsert(&identity))
    }

    fn get(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let uid = uid.to_owned();
        self.delegate(move |store| store.get(&uid))
    }

    fn update_best_score(
        &self,
        uid: &str,
        candidate: u64,
    ) -> BoxFuture<'static, StorageResult<BestScoreWrite>> {
        let uid = uid.to_owned();
        self.delegate(move |store| store.update_best_score(&uid, candidate))
    }

    fn increment_games_played(&self, uid: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let uid = uid.to_owned();
        self.delegate(move |store| store.increment_games_played(&uid))
    }

    fn top_by_best_score(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        self.delegate(move |store| store.top_by_best_score(limit))
    }

    fn record_score(&self, entry: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.delegate(move |store| store.record_score(entry))
    }

    fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        self.delegate(move |store| store.top_scores(difficulty, limit))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.delegate(|store| store.health_check())
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.delegate(|store| store.try_reconnect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::profile_store::MemoryProfileStore;

    #[tokio::test]
    async fn empty_slot_fails_fast_as_degraded() {
        let slot = StoreSlot::new();

        assert!(slot.is_degraded());
        assert!(matches!(slot.get("u1").await, Err(StorageError::Degraded)));
    }

    #[tokio::test]
    async fn installed_backend_receives_calls() {
        let slot = StoreSlot::new();
        let backend = MemoryProfileStore::new();
        slot.install(Arc::new(backend.clone())).await;

        slot.upsert(&Identity::anonymous("u1")).await.unwrap();

        assert!(!slot.is_degraded());
        assert!(backend.get("u1").await.unwrap().is_some());

        slot.clear().await;
        assert!(slot.is_degraded());
    }

    #[tokio::test]
    async fn watcher_only_sees_real_changes() {
        let slot = StoreSlot::new();
        let mut watcher = slot.degraded_watcher();

        slot.set_degraded(true);
        assert!(!watcher.has_changed().unwrap());

        slot.set_degraded(false);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
    }
}
