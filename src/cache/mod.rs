//! Best-effort on-device mirror of profile fields and client preferences.
//!
//! Every operation is synchronous and infallible from the caller's point of
//! view: storage failures are logged and degrade to a no-op or `None`.

mod storage;

pub use storage::{
    CacheError, CacheResult, DisabledStorage, FileStorage, KeyValueStorage, MemoryStorage,
};

use std::sync::Arc;

use tracing::warn;

use crate::dao::models::ProfileEntity;

/// Scalar best score written by installations that predate profiles.
pub const LEGACY_BEST_SCORE_KEY: &str = "camblaster_best_score";
/// Set once the first-run tutorial has been shown.
pub const TUTORIAL_SEEN_KEY: &str = "hasSeenTutorial";
/// Persisted mute preference.
pub const MUTED_KEY: &str = "camblaster_muted";
const PROFILE_KEY_PREFIX: &str = "camblaster_profile_";

fn profile_key(uid: &str) -> String {
    format!("{PROFILE_KEY_PREFIX}{uid}")
}

/// Non-authoritative shadow of the remote profile, shared by the request path
/// and background writers.
#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn KeyValueStorage>,
}

impl LocalCache {
    /// Cache over any [`KeyValueStorage`].
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Cache backed by volatile memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Cache that stores nothing.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledStorage))
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "local cache read failed");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.storage.set_item(key, value) {
            warn!(key, error = %err, "local cache write failed");
        }
    }

    /// Last profile observed for `uid`. Undecodable entries are treated as absent.
    pub fn get_profile(&self, uid: &str) -> Option<ProfileEntity> {
        let key = profile_key(uid);
        let raw = self.read(&key)?;
        match serde_json::from_str::<ProfileEntity>(&raw) {
            Ok(profile) if profile.uid == uid => Some(profile),
            Ok(profile) => {
                warn!(key, cached_uid = %profile.uid, "cached profile belongs to another uid");
                None
            }
            Err(source) => {
                let err = CacheError::Corrupt {
                    key: key.clone(),
                    source,
                };
                warn!(key, error = %err, "discarding cached profile");
                None
            }
        }
    }

    /// Mirror `profile` under its per-uid key.
    pub fn set_profile(&self, uid: &str, profile: &ProfileEntity) {
        let key = profile_key(uid);
        match serde_json::to_string(profile) {
            Ok(raw) => self.write(&key, &raw),
            Err(err) => warn!(key, error = %err, "failed to encode profile for cache"),
        }
    }

    /// Best score stored under the pre-profile scalar key.
    pub fn legacy_best_score(&self) -> Option<u64> {
        let raw = self.read(LEGACY_BEST_SCORE_KEY)?;
        match raw.trim().parse::<u64>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = LEGACY_BEST_SCORE_KEY, error = %err, "ignoring legacy best score");
                None
            }
        }
    }

    /// Raise the legacy scalar; never lowers it.
    pub fn set_legacy_best_score(&self, value: u64) {
        if self.legacy_best_score().is_some_and(|stored| stored >= value) {
            return;
        }
        self.write(LEGACY_BEST_SCORE_KEY, &value.to_string());
    }

    /// Whether the tutorial has been shown on this device.
    pub fn tutorial_seen(&self) -> bool {
        self.read(TUTORIAL_SEEN_KEY).as_deref() == Some("true")
    }

    /// Remember that the tutorial has been shown.
    pub fn mark_tutorial_seen(&self) {
        self.write(TUTORIAL_SEEN_KEY, "true");
    }

    /// Persisted mute preference; unmuted when unset.
    pub fn muted(&self) -> bool {
        self.read(MUTED_KEY).as_deref() == Some("true")
    }

    /// Persist the mute preference.
    pub fn set_muted(&self, muted: bool) {
        self.write(MUTED_KEY, if muted { "true" } else { "false" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::Identity;

    #[test]
    fn profile_round_trips_under_its_uid() {
        let cache = LocalCache::in_memory();
        let mut profile = ProfileEntity::fresh(&Identity::anonymous("u1"));
        profile.best_score = 900;

        cache.set_profile("u1", &profile);

        assert_eq!(cache.get_profile("u1"), Some(profile));
        assert_eq!(cache.get_profile("u2"), None);
    }

    #[test]
    fn corrupt_profile_entry_reads_as_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("camblaster_profile_u1", "{oops").unwrap();

        let cache = LocalCache::new(storage);
        assert_eq!(cache.get_profile("u1"), None);
    }

    #[test]
    fn legacy_scalar_only_grows() {
        let cache = LocalCache::in_memory();
        assert_eq!(cache.legacy_best_score(), None);

        cache.set_legacy_best_score(300);
        cache.set_legacy_best_score(120);

        assert_eq!(cache.legacy_best_score(), Some(300));
    }

    #[test]
    fn flags_default_to_false() {
        let cache = LocalCache::in_memory();
        assert!(!cache.tutorial_seen());
        assert!(!cache.muted());

        cache.mark_tutorial_seen();
        cache.set_muted(true);
        assert!(cache.tutorial_seen());
        assert!(cache.muted());

        cache.set_muted(false);
        assert!(!cache.muted());
    }

    #[test]
    fn disabled_cache_degrades_silently() {
        let cache = LocalCache::disabled();
        cache.set_profile("u1", &ProfileEntity::fresh(&Identity::anonymous("u1")));
        cache.set_legacy_best_score(10);
        cache.mark_tutorial_seen();

        assert_eq!(cache.get_profile("u1"), None);
        assert_eq!(cache.legacy_best_score(), None);
        assert!(!cache.tutorial_seen());
    }
}
