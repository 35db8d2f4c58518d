/// Session controller running the entry actions of each screen.
pub mod session;
mod sse;
/// Screen flow state machine.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::{
    cache::LocalCache,
    config::AppConfig,
    dao::profile_store::{ProfileStore, StoreSlot},
    services::{
        audio::AudioHandle,
        leaderboard_service::LeaderboardService,
        reconciler::{PendingWrites, ScoreReconciler},
        sse_events,
    },
    state::session::{ControllerParts, SessionController},
};

pub use self::sse::SseHub;
pub use self::state_machine::{ApplyError, PlanError};

/// Handle on [`AppState`] cloned into every route.
pub type SharedState = Arc<AppState>;

/// Central application state shared by every route.
pub struct AppState {
    config: AppConfig,
    slot: StoreSlot,
    sse: SseHub,
    leaderboard: LeaderboardService,
    pending_writes: PendingWrites,
    controller: Mutex<SessionController>,
}

impl AppState {
    /// Wire the session controller over `slot` and `cache`.
    ///
    /// `sse` must be the hub the audio sink publishes on so a single stream
    /// carries both transitions and sound cues.
    pub fn new(
        config: AppConfig,
        slot: StoreSlot,
        cache: LocalCache,
        audio: AudioHandle,
        sse: SseHub,
    ) -> SharedState {
        let store: Arc<dyn ProfileStore> = Arc::new(slot.clone());
        let leaderboard = LeaderboardService::new(store.clone());
        let controller = SessionController::new(ControllerParts {
            reconciler: ScoreReconciler::new(store, cache, config.login_timeout),
            leaderboard: leaderboard.clone(),
            audio,
            events: sse.clone(),
            leaderboard_size: config.leaderboard_size,
        });

        let pending_writes = controller.pending_writes();

        Arc::new(Self {
            config,
            slot,
            sse,
            leaderboard,
            pending_writes,
            controller: Mutex::new(controller),
        })
    }

    /// Settings loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Holder of the remote store, swapped by the storage supervisor.
    pub fn slot(&self) -> &StoreSlot {
        &self.slot
    }

    /// Background store writes still in flight; never waits on the controller.
    pub fn pending_writes(&self) -> &PendingWrites {
        &self.pending_writes
    }

    /// Broadcast hub used for the SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Read-only ranking queries for the public routes.
    pub fn leaderboard(&self) -> &LeaderboardService {
        &self.leaderboard
    }

    /// The single client session. Held across entry actions so events are serialized.
    pub fn controller(&self) -> &Mutex<SessionController> {
        &self.controller
    }
}

/// Relay degraded mode changes of the store slot onto the SSE stream until the slot is dropped.
pub async fn forward_degraded_status(state: SharedState) {
    let mut watcher = state.slot.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        info!(degraded, "degraded mode changed");
        sse_events::broadcast_system_status(&state.sse, degraded);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        dao::profile_store::MemoryProfileStore,
        services::audio::{AudioConfig, AudioSubsystem, SseSoundSink},
    };

    #[tokio::test]
    async fn degraded_changes_reach_sse_subscribers() {
        let sse = SseHub::new(8);
        let audio = AudioSubsystem::start(
            AudioConfig::default(),
            Arc::new(SseSoundSink::new(sse.clone())),
        );
        let state = AppState::new(
            AppConfig::default(),
            StoreSlot::new(),
            LocalCache::in_memory(),
            audio.handle(),
            sse,
        );
        let mut events = state.sse().subscribe();
        let forwarder = tokio::spawn(forward_degraded_status(state.clone()));
        tokio::task::yield_now().await;

        state
            .slot()
            .install(Arc::new(MemoryProfileStore::new()))
            .await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some("system_status"));
        assert_eq!(event.data, r#"{"degraded":false}"#);

        forwarder.abort();
        audio.shutdown().await;
    }
}
