/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
mod slot;

pub use memory::MemoryProfileStore;
pub use slot::StoreSlot;

use crate::dao::models::{BestScoreWrite, Difficulty, Identity, ProfileEntity, ScoreEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Remote persistence for per-user profile documents and the score log.
///
/// Every future is `'static` so callers can spawn it and walk away.
pub trait ProfileStore: Send + Sync {
    /// Create the profile if absent, otherwise refresh identity fields and `lastSeen`.
    fn upsert(&self, identity: &Identity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a profile; `None` when no document exists.
    fn get(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>>;
    /// Store `candidate` as best score only when it beats the stored value.
    fn update_best_score(
        &self,
        uid: &str,
        candidate: u64,
    ) -> BoxFuture<'static, StorageResult<BestScoreWrite>>;
    /// Atomically add one to `gamesPlayed`; `false` when the profile does not exist.
    fn increment_games_played(&self, uid: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Up to `limit` profiles ordered by best score, highest first.
    fn top_by_best_score(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>>;
    /// Append an entry to the score log.
    fn record_score(&self, entry: ScoreEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Up to `limit` score log entries for `difficulty`, highest first.
    fn top_scores(
        &self,
        difficulty: Difficulty,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>>;
    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
