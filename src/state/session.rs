//! Orchestration of the screen flow and the reconciliation entry actions.

use uuid::Uuid;

use tracing::{debug, info};

use crate::{
    dao::models::{Difficulty, Identity, ProfileEntity, ScoreEntity},
    error::ServiceError,
    services::{
        audio::{AudioHandle, SoundKind},
        leaderboard_service::{LeaderboardService, Rank, rank_of},
        reconciler::{LoginSource, PendingWrites, ScoreReconciler},
        sse_events,
    },
    state::{
        SseHub,
        state_machine::{Plan, SessionEvent, SessionPhase, SessionStateMachine, Snapshot},
    },
};

/// One gameplay round. Created on entering `playing`, dropped on leaving `game_over`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Round id, used in logs.
    pub id: Uuid,
    /// Difficulty chosen before the round.
    pub difficulty: Difficulty,
    /// Highest total reported so far.
    pub current_score: u64,
    /// Best score known when the round started.
    pub best_at_start: u64,
    /// Set once the round has been counted in `gamesPlayed` and the score log.
    pub counted_games_played: bool,
    /// Set once the new-best cue has been played for this round.
    pub announced_new_best: bool,
    /// Filled by the game-over handler.
    pub summary: Option<GameOverSummary>,
}

impl Session {
    fn new(difficulty: Difficulty, best_at_start: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            difficulty,
            current_score: 0,
            best_at_start,
            counted_games_played: false,
            announced_new_best: false,
            summary: None,
        }
    }
}

/// Result of a score report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreReport {
    /// Highest total of the round so far.
    pub current_score: u64,
    /// Best score of the working profile.
    pub best_score: u64,
    /// The report raised the best score.
    pub improved: bool,
}

/// Everything the game-over screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOverSummary {
    /// Final score of the round.
    pub score: u64,
    /// Best score after the round.
    pub best_score: u64,
    /// The round beat the best score it started with.
    pub is_new_best: bool,
    /// Difficulty of the round.
    pub difficulty: Difficulty,
    /// Top profiles by best score; empty when the store failed.
    pub leaderboard: Vec<ProfileEntity>,
    /// Place of the player inside `leaderboard`.
    pub rank: Rank,
    /// Best rounds at this difficulty.
    pub difficulty_leaderboard: Vec<ScoreEntity>,
}

/// Signed-in user as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Identity as last reported by the provider.
    pub identity: Identity,
    /// Working profile; the source of truth for the client.
    pub profile: ProfileEntity,
    /// Where `profile` came from at sign-in.
    pub source: LoginSource,
}

/// Read-only view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    /// State machine phase and version.
    pub machine: Snapshot,
    /// Signed-in player, if any.
    pub player: Option<Player>,
    /// Last chosen difficulty.
    pub difficulty: Difficulty,
    /// Round on screen, if any.
    pub session: Option<Session>,
    /// Cached tutorial flag.
    pub tutorial_seen: bool,
    /// Current mute preference.
    pub muted: bool,
}

/// Collaborators and settings the controller is built from.
pub struct ControllerParts {
    /// Store and cache mediator.
    pub reconciler: ScoreReconciler,
    /// Ranking queries for the game-over screen.
    pub leaderboard: LeaderboardService,
    /// Cue sender.
    pub audio: AudioHandle,
    /// Hub receiving `phase_changed` events.
    pub events: SseHub,
    /// Window size of the game-over leaderboards.
    pub leaderboard_size: usize,
}

/// Drives the state machine and runs each entry action exactly once per event.
pub struct SessionController {
    machine: SessionStateMachine,
    reconciler: ScoreReconciler,
    leaderboard: LeaderboardService,
    audio: AudioHandle,
    events: SseHub,
    leaderboard_size: usize,
    player: Option<Player>,
    difficulty: Difficulty,
    session: Option<Session>,
}

impl SessionController {
    /// Controller on the welcome screen with nobody signed in.
    pub fn new(parts: ControllerParts) -> Self {
        Self {
            machine: SessionStateMachine::new(),
            reconciler: parts.reconciler,
            leaderboard: parts.leaderboard,
            audio: parts.audio,
            events: parts.events,
            leaderboard_size: parts.leaderboard_size,
            player: None,
            difficulty: Difficulty::default(),
            session: None,
        }
    }

    /// Current screen.
    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    /// Signed-in player, if any.
    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    /// Copy of everything the client renders.
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            machine: self.machine.snapshot(),
            player: self.player.clone(),
            difficulty: self.difficulty,
            session: self.session.clone(),
            tutorial_seen: self.reconciler.cache().tutorial_seen(),
            muted: self.audio.is_muted(),
        }
    }

    fn commit(&mut self, plan: Plan) -> Result<SessionPhase, ServiceError> {
        let phase = self.machine.apply(plan.id)?;
        debug!(from = ?plan.from, to = ?phase, event = ?plan.event, "session transition applied");
        sse_events::broadcast_phase_changed(&self.events, &self.snapshot());
        Ok(phase)
    }

    fn require_player(&self) -> Result<&Player, ServiceError> {
        self.player.as_ref().ok_or(ServiceError::NotSignedIn)
    }

    fn start_session(&mut self) {
        let best = self
            .player
            .as_ref()
            .map(|player| player.profile.best_score)
            .unwrap_or(0);
        let session = Session::new(self.difficulty, best);
        debug!(session = %session.id, difficulty = %session.difficulty, "session started");
        self.session = Some(session);
    }

    /// Adopt a new identity and run login reconciliation for it.
    ///
    /// Any running round is discarded without being counted. Signing in again
    /// with the uid already signed in only refreshes the identity fields.
    pub async fn sign_in(&mut self, identity: Identity) -> Result<&Player, ServiceError> {
        if let Some(player) = self.player.as_mut()
            && player.identity.uid == identity.uid
        {
            player.profile.apply_identity(&identity);
            player.identity = identity;
            return self.require_player();
        }

        self.machine.check(SessionEvent::IdentityChanged)?;
        let outcome = self.reconciler.login(&identity).await;

        // nothing awaits between plan and commit; a dropped caller never leaves a plan pending
        let plan = self.machine.plan(SessionEvent::IdentityChanged)?;
        self.discard_session();
        info!(
            uid = %identity.uid,
            source = ?outcome.source,
            best_score = outcome.profile.best_score,
            "signed in"
        );
        self.player = Some(Player {
            identity,
            profile: outcome.profile,
            source: outcome.source,
        });
        self.commit(plan)?;
        self.require_player()
    }

    /// Forget the player and go back to the welcome screen, discarding any round.
    pub fn sign_out(&mut self) -> Result<SessionPhase, ServiceError> {
        let plan = self.machine.plan(SessionEvent::IdentityChanged)?;
        self.discard_session();
        if let Some(player) = self.player.take() {
            info!(uid = %player.identity.uid, "signed out");
        }
        self.commit(plan)
    }

    fn discard_session(&mut self) {
        if let Some(session) = self.session.take()
            && !session.counted_games_played
        {
            debug!(session = %session.id, "discarding uncounted session");
        }
    }

    /// Leave the welcome screen with the chosen difficulty.
    pub fn begin(
        &mut self,
        difficulty: Difficulty,
        skip_tutorial: bool,
    ) -> Result<SessionPhase, ServiceError> {
        self.require_player()?;
        let cache = self.reconciler.cache();
        if skip_tutorial && !cache.tutorial_seen() {
            cache.mark_tutorial_seen();
        }
        let skip_tutorial = cache.tutorial_seen();

        let plan = self.machine.plan(SessionEvent::Begin { skip_tutorial })?;
        self.difficulty = difficulty;
        if plan.to == SessionPhase::Playing {
            self.start_session();
        }
        self.commit(plan)
    }

    /// Mark the tutorial as seen and start the round.
    pub fn finish_tutorial(&mut self) -> Result<SessionPhase, ServiceError> {
        let plan = self.machine.plan(SessionEvent::TutorialFinished)?;
        self.reconciler.cache().mark_tutorial_seen();
        self.start_session();
        self.commit(plan)
    }

    /// Record the running total of the current round.
    pub fn report_score(&mut self, total: u64) -> Result<ScoreReport, ServiceError> {
        if self.machine.phase() != SessionPhase::Playing {
            return Err(ServiceError::InvalidState(format!(
                "scores are only accepted while playing (currently {:?})",
                self.machine.phase()
            )));
        }
        let (Some(player), Some(session)) = (self.player.as_mut(), self.session.as_mut()) else {
            return Err(ServiceError::NotSignedIn);
        };

        session.current_score = session.current_score.max(total);
        let improved = self.reconciler.offer(&mut player.profile, total);
        if improved && !session.announced_new_best {
            session.announced_new_best = true;
            self.audio.play(SoundKind::NewBest);
        }

        Ok(ScoreReport {
            current_score: session.current_score,
            best_score: player.profile.best_score,
            improved,
        })
    }

    /// Run the game-over handler. Safe to call again while on the game-over screen.
    ///
    /// Round accounting is guarded by per-round flags, so a call dropped while
    /// the leaderboards load can be retried without counting the round twice.
    pub async fn game_over(
        &mut self,
        final_score: Option<u64>,
    ) -> Result<GameOverSummary, ServiceError> {
        self.machine.check(SessionEvent::GameEnded)?;
        let from = self.machine.phase();
        let (Some(player), Some(session)) = (self.player.as_mut(), self.session.as_mut()) else {
            return Err(ServiceError::NotSignedIn);
        };

        if from == SessionPhase::Playing
            && let Some(score) = final_score
        {
            session.current_score = session.current_score.max(score);
        }
        let score = session.current_score;

        if self.reconciler.offer(&mut player.profile, score) && !session.announced_new_best {
            session.announced_new_best = true;
            self.audio.play(SoundKind::NewBest);
        }

        if !session.counted_games_played {
            session.counted_games_played = true;
            player.profile.games_played += 1;
            self.reconciler.count_game(&player.profile.uid);
            if score > 0 {
                self.reconciler
                    .record_score(&player.profile, score, session.difficulty);
            }
            self.audio.play(SoundKind::GameOver);
            info!(
                uid = %player.profile.uid,
                score,
                difficulty = %session.difficulty,
                "game over"
            );
        }

        let best_score = player.profile.best_score;
        let uid = player.profile.uid.clone();
        let difficulty = session.difficulty;
        let is_new_best = score > 0 && score > session.best_at_start;

        let leaderboard = self.leaderboard.top_n(self.leaderboard_size).await;
        let rank = rank_of(&uid, &leaderboard);
        let difficulty_leaderboard = self
            .leaderboard
            .top_scores(difficulty, self.leaderboard_size)
            .await;

        let summary = GameOverSummary {
            score,
            best_score,
            is_new_best,
            difficulty,
            leaderboard,
            rank,
            difficulty_leaderboard,
        };
        let plan = self.machine.plan(SessionEvent::GameEnded)?;
        if let Some(session) = self.session.as_mut() {
            session.summary = Some(summary.clone());
        }
        self.commit(plan)?;
        Ok(summary)
    }

    /// Start a new round with the same difficulty.
    pub fn restart(&mut self) -> Result<SessionPhase, ServiceError> {
        let plan = self.machine.plan(SessionEvent::Restart)?;
        self.start_session();
        self.commit(plan)
    }

    /// Leave the game-over screen.
    pub fn return_to_menu(&mut self) -> Result<SessionPhase, ServiceError> {
        let plan = self.machine.plan(SessionEvent::ReturnToMenu)?;
        self.discard_session();
        self.commit(plan)
    }

    /// Flip the mute preference, persist it, and return the new value.
    pub async fn toggle_mute(&mut self) -> bool {
        let muted = self.audio.toggle_mute().await;
        self.reconciler.cache().set_muted(muted);
        muted
    }

    /// Forward a gameplay cue (pop, shoot, combo) to the audio subsystem.
    pub fn play(&self, kind: SoundKind) {
        self.audio.play(kind);
    }

    /// Count of store writes spawned and not yet finished; readable without the controller.
    pub fn pending_writes(&self) -> PendingWrites {
        self.reconciler.pending_writes()
    }

    /// Wait for every fire-and-forget store write issued so far.
    pub async fn settle(&mut self) {
        self.reconciler.settle().await;
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        cache::LocalCache,
        dao::profile_store::{MemoryProfileStore, ProfileStore},
        services::audio::{AudioConfig, AudioSubsystem, SseSoundSink},
    };

    struct Harness {
        controller: SessionController,
        store: MemoryProfileStore,
        cache: LocalCache,
        events: SseHub,
        _audio: AudioSubsystem,
    }

    fn harness() -> Harness {
        let store = MemoryProfileStore::new();
        let cache = LocalCache::in_memory();
        let events = SseHub::new(64);
        let shared: Arc<dyn ProfileStore> = Arc::new(store.clone());
        let audio = AudioSubsystem::start(
            AudioConfig::default(),
            Arc::new(SseSoundSink::new(events.clone())),
        );
        let controller = SessionController::new(ControllerParts {
            reconciler: ScoreReconciler::new(
                shared.clone(),
                cache.clone(),
                Duration::from_secs(3),
            ),
            leaderboard: LeaderboardService::new(shared),
            audio: audio.handle(),
            events: events.clone(),
            leaderboard_size: 10,
        });

        Harness {
            controller,
            store,
            cache,
            events,
            _audio: audio,
        }
    }

    fn ada() -> Identity {
        Identity {
            uid: "u1".into(),
            display_name: Some("Ada".into()),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn scores_require_a_running_round() {
        let mut h = harness();
        h.controller.sign_in(ada()).await.unwrap();

        assert!(matches!(
            h.controller.report_score(10),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn begin_requires_sign_in() {
        let mut h = harness();
        assert!(matches!(
            h.controller.begin(Difficulty::Easy, false),
            Err(ServiceError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn first_round_goes_through_the_tutorial_once() {
        let mut h = harness();
        h.controller.sign_in(ada()).await.unwrap();

        assert_eq!(
            h.controller.begin(Difficulty::Hard, false).unwrap(),
            SessionPhase::Tutorial
        );
        assert!(h.controller.snapshot().session.is_none());
        assert_eq!(
            h.controller.finish_tutorial().unwrap(),
            SessionPhase::Playing
        );
        assert!(h.cache.tutorial_seen());

        h.controller.game_over(Some(0)).await.unwrap();
        h.controller.return_to_menu().unwrap();
        assert_eq!(
            h.controller.begin(Difficulty::Hard, false).unwrap(),
            SessionPhase::Playing
        );
    }

    #[tokio::test]
    async fn repeated_game_over_counts_the_round_once() {
        let mut h = harness();
        h.controller.sign_in(ada()).await.unwrap();
        h.controller.begin(Difficulty::Medium, true).unwrap();
        h.controller.report_score(120).unwrap();

        let first = h.controller.game_over(None).await.unwrap();
        let again = h.controller.game_over(Some(999)).await.unwrap();
        h.controller.settle().await;

        assert_eq!(first.score, 120);
        assert_eq!(again.score, 120);
        assert!(first.is_new_best);
        assert_eq!(again.rank, Rank::Position(1));

        let stored = h.store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.games_played, 1);
        assert_eq!(stored.best_score, 120);
        assert_eq!(h.store.scores().await.len(), 1);
    }

    #[tokio::test]
    async fn zero_score_rounds_are_counted_but_not_logged() {
        let mut h = harness();
        h.controller.sign_in(ada()).await.unwrap();
        h.controller.begin(Difficulty::Easy, true).unwrap();

        let summary = h.controller.game_over(Some(0)).await.unwrap();
        h.controller.settle().await;

        assert!(!summary.is_new_best);
        assert_eq!(h.store.get("u1").await.unwrap().unwrap().games_played, 1);
        assert!(h.store.scores().await.is_empty());
    }

    #[tokio::test]
    async fn new_best_cue_plays_once_per_round() {
        let mut h = harness();
        let mut sounds = h.events.subscribe();
        h.controller.sign_in(ada()).await.unwrap();
        h.controller.begin(Difficulty::Easy, true).unwrap();

        h.controller.report_score(10).unwrap();
        h.controller.report_score(20).unwrap();
        h.controller.game_over(Some(30)).await.unwrap();
        h.controller.settle().await;
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut new_best = 0;
        let mut game_over = 0;
        while let Ok(event) = sounds.try_recv() {
            if event.event.as_deref() != Some("sound") {
                continue;
            }
            if event.data.contains("\"kind\":\"new_best\"") {
                new_best += 1;
            }
            if event.data.contains("\"kind\":\"game_over\"") {
                game_over += 1;
            }
        }
        assert_eq!(new_best, 1);
        assert_eq!(game_over, 1);
    }

    #[tokio::test]
    async fn signing_out_mid_round_discards_it() {
        let mut h = harness();
        h.controller.sign_in(ada()).await.unwrap();
        h.controller.begin(Difficulty::Easy, true).unwrap();
        h.controller.report_score(50).unwrap();

        assert_eq!(h.controller.sign_out().unwrap(), SessionPhase::Welcome);
        h.controller.settle().await;

        assert!(h.controller.snapshot().session.is_none());
        assert!(h.controller.player().is_none());
        assert_eq!(h.store.get("u1").await.unwrap().unwrap().games_played, 0);
    }

    #[tokio::test]
    async fn restart_keeps_difficulty_and_resets_the_round() {
        let mut h = harness();
        h.controller.sign_in(ada()).await.unwrap();
        h.controller.begin(Difficulty::Hard, true).unwrap();
        h.controller.report_score(70).unwrap();
        h.controller.game_over(None).await.unwrap();

        assert_eq!(h.controller.restart().unwrap(), SessionPhase::Playing);
        let session = h.controller.snapshot().session.unwrap();
        assert_eq!(session.difficulty, Difficulty::Hard);
        assert_eq!(session.current_score, 0);
        assert!(!session.counted_games_played);
        assert_eq!(session.best_at_start, 70);
    }

    #[tokio::test]
    async fn transitions_are_broadcast() {
        let mut h = harness();
        let mut events = h.events.subscribe();
        h.controller.sign_in(ada()).await.unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("phase_changed"));
        assert!(event.data.contains("\"phase\":\"welcome\""));
    }

    #[tokio::test]
    async fn toggling_mute_persists_the_preference() {
        let mut h = harness();
        assert!(h.controller.toggle_mute().await);
        assert!(h.cache.muted());
        assert!(!h.controller.toggle_mute().await);
        assert!(!h.cache.muted());
    }
}
