use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Leaderboard and profile payloads.
pub mod leaderboard;
/// Mute and sound payloads.
pub mod preferences;
/// Session requests and views.
pub mod session;
/// Server-Sent Events payloads.
pub mod sse;
/// Shared field validators.
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
