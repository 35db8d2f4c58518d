use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::dao::{
    models::{Difficulty, ProfileEntity, ScoreEntity},
    profile_store::ProfileStore,
};

/// 1-based position of a user inside a fetched top-N window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "position", rename_all = "snake_case")]
pub enum Rank {
    /// 1-based place inside the window.
    Position(usize),
    /// The user is not inside the window; their real rank is not computed.
    Unknown,
}

/// Read-only ranking queries. Store failures degrade to an empty list.
#[derive(Clone)]
pub struct LeaderboardService {
    store: Arc<dyn ProfileStore>,
}

impl LeaderboardService {
    /// Queries go straight to `store`; nothing is cached.
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Up to `limit` profiles by best score, highest first.
    pub async fn top_n(&self, limit: usize) -> Vec<ProfileEntity> {
        match self.store.top_by_best_score(limit).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(limit, error = %err, "leaderboard query failed");
                Vec::new()
            }
        }
    }

    /// Best `limit` score log entries for `difficulty`.
    pub async fn top_scores(&self, difficulty: Difficulty, limit: usize) -> Vec<ScoreEntity> {
        match self.store.top_scores(difficulty, limit).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%difficulty, limit, error = %err, "difficulty leaderboard query failed");
                Vec::new()
            }
        }
    }
}

/// Position of `uid` inside `entries`; no query beyond the given window.
pub fn rank_of(uid: &str, entries: &[ProfileEntity]) -> Rank {
    entries
        .iter()
        .position(|entry| entry.uid == uid)
        .map(|index| Rank::Position(index + 1))
        .unwrap_or(Rank::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{models::Identity, profile_store::MemoryProfileStore};

    async fn seeded_store(count: u64) -> MemoryProfileStore {
        let store = MemoryProfileStore::new();
        for n in 0..count {
            let mut profile = ProfileEntity::fresh(&Identity::anonymous(format!("p{n}")));
            profile.best_score = 1_000 - n * 10;
            store.insert(profile).await;
        }
        store
    }

    #[tokio::test]
    async fn rank_matches_the_position_in_the_window() {
        let store = seeded_store(12).await;
        let service = LeaderboardService::new(Arc::new(store));

        let top = service.top_n(10).await;
        assert_eq!(top.len(), 10);
        assert_eq!(rank_of("p0", &top), Rank::Position(1));
        assert_eq!(rank_of("p4", &top), Rank::Position(5));
        assert_eq!(rank_of("p9", &top), Rank::Position(10));
    }

    #[tokio::test]
    async fn users_below_the_cutoff_have_no_rank() {
        let store = seeded_store(12).await;
        let mut below = ProfileEntity::fresh(&Identity::anonymous("late"));
        below.best_score = 5;
        store.insert(below).await;
        let service = LeaderboardService::new(Arc::new(store));

        let top = service.top_n(10).await;
        assert_eq!(rank_of("late", &top), Rank::Unknown);
        assert_eq!(rank_of("p11", &top), Rank::Unknown);
    }

    #[tokio::test]
    async fn store_failure_yields_an_empty_leaderboard() {
        let store = seeded_store(3).await;
        store.set_offline(true);
        let service = LeaderboardService::new(Arc::new(store));

        assert!(service.top_n(10).await.is_empty());
        assert!(service.top_scores(Difficulty::Easy, 10).await.is_empty());
    }

    #[test]
    fn rank_serializes_with_its_kind() {
        let json = serde_json::to_value(Rank::Position(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "position", "position": 3 }));

        let json = serde_json::to_value(Rank::Unknown).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "unknown" }));
    }
}
