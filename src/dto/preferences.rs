use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::audio::SoundKind;

/// Mute preference after a toggle.
#[derive(Debug, Serialize, ToSchema)]
pub struct MuteResponse {
    /// New value of the preference.
    pub muted: bool,
}

/// Gameplay cue requested by the renderer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SoundRequest {
    /// Only `pop`, `shoot` and `combo` are accepted.
    pub kind: SoundKind,
}
