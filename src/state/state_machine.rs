use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Screens the client moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Initial screen; sign-in and difficulty selection happen here.
    Welcome,
    /// First-run walkthrough, skipped once it has been seen.
    Tutorial,
    /// A round is running and score reports are accepted.
    Playing,
    /// Round finished; final score and leaderboards are shown.
    GameOver,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Leave the welcome screen.
    Begin {
        /// Go straight to playing because the tutorial was already seen.
        skip_tutorial: bool,
    },
    /// The tutorial was dismissed.
    TutorialFinished,
    /// The round ended; also accepted while already on the game-over screen.
    GameEnded,
    /// Play again from the game-over screen.
    Restart,
    /// Back to the welcome screen from game over.
    ReturnToMenu,
    /// Sign-in or sign-out; always lands on the welcome screen.
    IdentityChanged,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the event was applied in.
    pub from: SessionPhase,
    /// Rejected event.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    #[error("a transition is already pending")]
    AlreadyPending,
    /// The event is not accepted in the current phase.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Nothing was planned.
    #[error("no transition is pending")]
    NoPending,
    /// Another plan is pending.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
    /// The machine moved since the plan was made.
    #[error("version changed during transition (expected {expected}, got {actual})")]
    VersionMismatch { expected: usize, actual: usize },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// Nothing was planned.
    #[error("no transition is pending")]
    NoPending,
    /// Another plan is pending.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition whose entry actions have not run yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Identifier passed back to apply or abort.
    pub id: PlanId,
    /// Phase when the plan was made.
    pub from: SessionPhase,
    /// Phase after applying.
    pub to: SessionPhase,
    /// Event being applied.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: SessionPhase,
    /// Increments on each applied transition.
    pub version: usize,
    /// Target of the pending plan, if any.
    pub pending: Option<SessionPhase>,
}

/// Screen flow of the client: plan a transition, run entry actions, then apply or abort.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Welcome,
            version: 0,
            pending: None,
        }
    }
}

impl SessionStateMachine {
    /// Machine on the welcome screen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Phase, version and pending target.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate `event` against the current phase without reserving anything.
    pub fn check(&self, event: SessionEvent) -> Result<SessionPhase, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        Ok(self.compute_transition(event)?)
    }

    /// Validate `event` against the current phase and reserve the transition.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        let next = self.check(event)?;
        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
        };

        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Apply a planned transition and return the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        Ok(self.phase)
    }

    /// Drop a planned transition, staying in the current phase.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        use SessionEvent as E;
        use SessionPhase as P;

        let next = match (self.phase, event) {
            (_, E::IdentityChanged) => P::Welcome,
            (P::Welcome, E::Begin { skip_tutorial: true }) => P::Playing,
            (P::Welcome, E::Begin {
                skip_tutorial: false,
            }) => P::Tutorial,
            (P::Tutorial, E::TutorialFinished) => P::Playing,
            (P::Playing | P::GameOver, E::GameEnded) => P::GameOver,
            (P::GameOver, E::Restart) => P::Playing,
            (P::Tutorial | P::Playing | P::GameOver, E::ReturnToMenu) => P::Welcome,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn check_does_not_reserve_the_transition() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(
            sm.check(SessionEvent::IdentityChanged),
            Ok(SessionPhase::Welcome)
        );
        assert!(sm.snapshot().pending.is_none());
        assert!(matches!(
            sm.check(SessionEvent::GameEnded),
            Err(PlanError::InvalidTransition(_))
        ));

        let plan = sm.plan(SessionEvent::IdentityChanged).unwrap();
        assert_eq!(
            sm.check(SessionEvent::IdentityChanged),
            Err(PlanError::AlreadyPending)
        );
        sm.abort(plan.id).unwrap();
    }

    #[test]
    fn initial_state_is_welcome() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Welcome);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn first_run_goes_through_the_tutorial() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(
            apply(
                &mut sm,
                SessionEvent::Begin {
                    skip_tutorial: false
                }
            ),
            SessionPhase::Tutorial
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::TutorialFinished),
            SessionPhase::Playing
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::GameEnded),
            SessionPhase::GameOver
        );
        assert_eq!(apply(&mut sm, SessionEvent::Restart), SessionPhase::Playing);
        assert_eq!(
            apply(&mut sm, SessionEvent::ReturnToMenu),
            SessionPhase::Welcome
        );
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn seen_tutorial_is_skipped() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(
            apply(&mut sm, SessionEvent::Begin { skip_tutorial: true }),
            SessionPhase::Playing
        );
    }

    #[test]
    fn game_over_can_be_re_entered() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Begin { skip_tutorial: true });
        apply(&mut sm, SessionEvent::GameEnded);

        assert_eq!(
            apply(&mut sm, SessionEvent::GameEnded),
            SessionPhase::GameOver
        );
    }

    #[test]
    fn identity_change_returns_to_welcome_from_anywhere() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Begin { skip_tutorial: true });

        assert_eq!(
            apply(&mut sm, SessionEvent::IdentityChanged),
            SessionPhase::Welcome
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::IdentityChanged),
            SessionPhase::Welcome
        );
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = SessionStateMachine::new();
        let err = sm.plan(SessionEvent::GameEnded).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidTransition(InvalidTransition {
                from: SessionPhase::Welcome,
                event: SessionEvent::GameEnded,
            })
        );
        assert!(sm.snapshot().pending.is_none());
    }

    #[test]
    fn second_plan_is_rejected_while_pending() {
        let mut sm = SessionStateMachine::new();
        let plan = sm
            .plan(SessionEvent::Begin { skip_tutorial: true })
            .unwrap();

        assert_eq!(
            sm.plan(SessionEvent::ReturnToMenu).unwrap_err(),
            PlanError::AlreadyPending
        );
        assert_eq!(sm.snapshot().pending, Some(SessionPhase::Playing));

        sm.abort(plan.id).unwrap();
        assert_eq!(sm.phase(), SessionPhase::Welcome);
        assert!(sm.snapshot().pending.is_none());
    }

    #[test]
    fn apply_with_foreign_plan_id_keeps_the_pending_plan() {
        let mut sm = SessionStateMachine::new();
        let plan = sm.plan(SessionEvent::IdentityChanged).unwrap();

        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.apply(plan.id), Ok(SessionPhase::Welcome));
    }
}
