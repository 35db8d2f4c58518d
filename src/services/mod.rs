/// Sound cue catalogue and the audio subsystem.
pub mod audio;
/// Timeout race used by login reconciliation.
pub mod bounded;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Ranking queries over the profile store.
pub mod leaderboard_service;
/// Read-only leaderboard and profile projections.
pub mod public_service;
/// Merging of remote and cached profile state.
pub mod reconciler;
/// Client session operations.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Profile store connection supervision.
pub mod storage_supervisor;
