use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LiveError, LiveResult};

/// Phase of the live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Connecting,
    Listening,
    Speaking,
    /// Terminal until an explicit restart
    Error,
}

impl SessionPhase {
    /// Status line shown to the user
    pub fn status_text(self) -> &'static str {
        match self {
            SessionPhase::Idle => "Tap the icon to initiate a live conversation.",
            SessionPhase::Connecting => "Establishing secure connection...",
            SessionPhase::Listening => "Listening...",
            SessionPhase::Speaking => "Agent is speaking...",
            SessionPhase::Error => "Connection error. Please try again.",
        }
    }

    /// Whether the capture pipeline may run
    pub fn is_capturing(self) -> bool {
        matches!(self, SessionPhase::Listening | SessionPhase::Speaking)
    }

    pub fn can_start(self) -> bool {
        matches!(self, SessionPhase::Idle | SessionPhase::Error)
    }
}

/// Inputs that drive phase changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    Start,
    TransportOpened,
    ChunkReceived,
    /// The in-flight playback set became empty
    PlaybackDrained,
    Interrupted,
    Stop,
    Fail,
}

/// Single source of truth for the session phase
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: SessionPhase,
    last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Phase reached by applying `event` in `from`, if permitted
    pub fn next_phase(from: SessionPhase, event: PhaseEvent) -> Option<SessionPhase> {
        use PhaseEvent as E;
        use SessionPhase as P;

        match (from, event) {
            (P::Idle | P::Error, E::Start) => Some(P::Connecting),
            (P::Connecting, E::TransportOpened) => Some(P::Listening),
            (P::Listening | P::Speaking, E::ChunkReceived) => Some(P::Speaking),
            (P::Speaking, E::PlaybackDrained) => Some(P::Listening),
            (P::Speaking, E::Interrupted) => Some(P::Listening),
            // Barge-in before audio or while connecting leaves the phase alone
            (P::Listening | P::Connecting, E::Interrupted) => Some(from),
            // Explicit stop always lands on idle
            (_, E::Stop) => Some(P::Idle),
            (P::Connecting | P::Listening | P::Speaking, E::Fail) => Some(P::Error),
            _ => None,
        }
    }

    /// Apply `event`; rejected transitions leave the state untouched
    pub fn apply(&mut self, event: PhaseEvent) -> LiveResult<SessionPhase> {
        let from = self.phase;
        let to = Self::next_phase(from, event)
            .ok_or(LiveError::InvalidTransition { from, event })?;

        if from != to {
            debug!("Session phase {:?} -> {:?} ({:?})", from, to, event);
        }
        if event == PhaseEvent::Start {
            self.last_error = None;
        }
        self.phase = to;
        Ok(to)
    }

    /// Move to `Error`, recording a human-readable reason
    pub fn fail(&mut self, reason: impl Into<String>) -> LiveResult<SessionPhase> {
        let phase = self.apply(PhaseEvent::Fail)?;
        self.last_error = Some(reason.into());
        Ok(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_in(path: &[PhaseEvent]) -> SessionState {
        let mut state = SessionState::new();
        for event in path {
            state.apply(*event).unwrap();
        }
        state
    }

    #[test]
    fn test_happy_path() {
        let mut state = SessionState::new();
        assert_eq!(state.phase(), SessionPhase::Idle);

        assert_eq!(state.apply(PhaseEvent::Start).unwrap(), SessionPhase::Connecting);
        assert_eq!(state.apply(PhaseEvent::TransportOpened).unwrap(), SessionPhase::Listening);
        assert_eq!(state.apply(PhaseEvent::ChunkReceived).unwrap(), SessionPhase::Speaking);
        assert_eq!(state.apply(PhaseEvent::ChunkReceived).unwrap(), SessionPhase::Speaking);
        assert_eq!(state.apply(PhaseEvent::PlaybackDrained).unwrap(), SessionPhase::Listening);
        assert_eq!(state.apply(PhaseEvent::Stop).unwrap(), SessionPhase::Idle);
    }

    #[test]
    fn test_idle_cannot_skip_connecting() {
        let mut state = SessionState::new();

        for event in [PhaseEvent::TransportOpened, PhaseEvent::ChunkReceived, PhaseEvent::PlaybackDrained] {
            let err = state.apply(event).unwrap_err();
            assert!(matches!(err, LiveError::InvalidTransition { from: SessionPhase::Idle, .. }));
            assert_eq!(state.phase(), SessionPhase::Idle);
        }
    }

    #[test]
    fn test_chunk_while_connecting_rejected() {
        let mut state = state_in(&[PhaseEvent::Start]);
        assert!(state.apply(PhaseEvent::ChunkReceived).is_err());
        assert_eq!(state.phase(), SessionPhase::Connecting);
    }

    #[test]
    fn test_start_rejected_while_active() {
        let mut state = state_in(&[PhaseEvent::Start, PhaseEvent::TransportOpened]);
        assert!(state.apply(PhaseEvent::Start).is_err());
        assert_eq!(state.phase(), SessionPhase::Listening);
    }

    #[test]
    fn test_interrupt_only_changes_speaking() {
        let mut speaking = state_in(&[PhaseEvent::Start, PhaseEvent::TransportOpened, PhaseEvent::ChunkReceived]);
        assert_eq!(speaking.apply(PhaseEvent::Interrupted).unwrap(), SessionPhase::Listening);

        let mut connecting = state_in(&[PhaseEvent::Start]);
        assert_eq!(connecting.apply(PhaseEvent::Interrupted).unwrap(), SessionPhase::Connecting);

        let mut idle = SessionState::new();
        assert!(idle.apply(PhaseEvent::Interrupted).is_err());
    }

    #[test]
    fn test_fail_and_restart() {
        let mut state = state_in(&[PhaseEvent::Start]);
        state.fail("microphone denied").unwrap();

        assert_eq!(state.phase(), SessionPhase::Error);
        assert_eq!(state.last_error(), Some("microphone denied"));
        assert!(state.phase().can_start());

        state.apply(PhaseEvent::Start).unwrap();
        assert_eq!(state.phase(), SessionPhase::Connecting);
        assert_eq!(state.last_error(), None);
    }

    #[test]
    fn test_stop_from_any_phase_lands_idle() {
        for path in [
            vec![],
            vec![PhaseEvent::Start],
            vec![PhaseEvent::Start, PhaseEvent::TransportOpened],
            vec![PhaseEvent::Start, PhaseEvent::Fail],
        ] {
            let mut state = state_in(&path);
            assert_eq!(state.apply(PhaseEvent::Stop).unwrap(), SessionPhase::Idle);
        }
    }

    #[test]
    fn test_fail_from_idle_rejected() {
        let mut state = SessionState::new();
        assert!(state.fail("late error").is_err());
        assert_eq!(state.phase(), SessionPhase::Idle);
        assert_eq!(state.last_error(), None);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(SessionPhase::Speaking.status_text(), "Agent is speaking...");
        assert_eq!(SessionPhase::Listening.status_text(), "Listening...");
    }
}
