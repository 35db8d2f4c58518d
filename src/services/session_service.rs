//! Client session operations exposed over HTTP.

use tracing::debug;

use crate::{
    dao::models::Identity,
    dto::{
        preferences::MuteResponse,
        session::{
            BeginRequest, GameOverRequest, GameOverResponse, ScoreReportResponse, SessionView,
        },
    },
    error::ServiceError,
    services::audio::SoundKind,
    state::SharedState,
};

/// Current session snapshot.
pub async fn get_session(state: &SharedState) -> SessionView {
    let controller = state.controller().lock().await;
    SessionView::from(&controller.snapshot())
}

/// Sign in and return the resulting session.
pub async fn sign_in(state: &SharedState, identity: Identity) -> Result<SessionView, ServiceError> {
    let mut controller = state.controller().lock().await;
    controller.sign_in(identity).await?;
    Ok(SessionView::from(&controller.snapshot()))
}

/// Sign out and return the welcome-screen session.
pub async fn sign_out(state: &SharedState) -> Result<SessionView, ServiceError> {
    let mut controller = state.controller().lock().await;
    controller.sign_out()?;
    Ok(SessionView::from(&controller.snapshot()))
}

/// Leave the welcome screen.
pub async fn begin(state: &SharedState, request: BeginRequest) -> Result<SessionView, ServiceError> {
    let mut controller = state.controller().lock().await;
    controller.begin(request.difficulty, request.skip_tutorial)?;
    Ok(SessionView::from(&controller.snapshot()))
}

/// Dismiss the tutorial and start the round.
pub async fn finish_tutorial(state: &SharedState) -> Result<SessionView, ServiceError> {
    let mut controller = state.controller().lock().await;
    controller.finish_tutorial()?;
    Ok(SessionView::from(&controller.snapshot()))
}

/// Record the running total of the current round.
pub async fn report_score(
    state: &SharedState,
    score: u64,
) -> Result<ScoreReportResponse, ServiceError> {
    let mut controller = state.controller().lock().await;
    let report = controller.report_score(score)?;
    Ok(report.into())
}

/// Run the game-over handler and return what the game-over screen shows.
pub async fn game_over(
    state: &SharedState,
    request: GameOverRequest,
) -> Result<GameOverResponse, ServiceError> {
    let mut controller = state.controller().lock().await;
    let summary = controller.game_over(request.score).await?;
    Ok(summary.into())
}

/// Play again with the same difficulty.
pub async fn restart(state: &SharedState) -> Result<SessionView, ServiceError> {
    let mut controller = state.controller().lock().await;
    controller.restart()?;
    Ok(SessionView::from(&controller.snapshot()))
}

/// Leave the game-over screen.
pub async fn return_to_menu(state: &SharedState) -> Result<SessionView, ServiceError> {
    let mut controller = state.controller().lock().await;
    controller.return_to_menu()?;
    Ok(SessionView::from(&controller.snapshot()))
}

/// Flip and persist the mute preference.
pub async fn toggle_mute(state: &SharedState) -> MuteResponse {
    let mut controller = state.controller().lock().await;
    let muted = controller.toggle_mute().await;
    MuteResponse { muted }
}

/// Forward a gameplay cue requested by the renderer.
///
/// Cues the controller emits on its own (new best, game over) are refused.
pub async fn play_sound(state: &SharedState, kind: SoundKind) -> Result<(), ServiceError> {
    match kind {
        SoundKind::Pop | SoundKind::Shoot | SoundKind::Combo => {
            debug!(?kind, "renderer requested sound cue");
            state.controller().lock().await.play(kind);
            Ok(())
        }
        SoundKind::NewBest | SoundKind::GameOver => Err(ServiceError::InvalidInput(format!(
            "{kind:?} is played by the session controller"
        ))),
    }
}
