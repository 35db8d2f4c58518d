/// Domain records shared by every backend and the local cache.
pub mod models;
/// Remote profile store trait and its backends.
pub mod profile_store;
/// Backend-independent storage errors.
pub mod storage;
