use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorInfo, FlowError, Result};

/// Discrete state of one feature instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Uploading,
    Extracting,
    Ready,
    Generating,
    Succeeded,
    Failed,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Idle,
        Phase::Uploading,
        Phase::Extracting,
        Phase::Ready,
        Phase::Generating,
        Phase::Succeeded,
        Phase::Failed,
    ];

    /// Forward transitions of the state machine. Returning to `Idle`/`Ready`
    /// only happens through an explicit clear and is not listed here.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, Extracting)
                | (Uploading, Failed)
                | (Extracting, Ready)
                | (Extracting, Failed)
                | (Idle, Generating)
                | (Ready, Generating)
                | (Generating, Succeeded)
                | (Generating, Failed)
        )
    }

    /// A network step is in flight
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Extracting | Phase::Generating)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// Position along the machine; every forward transition strictly increases it.
    pub fn rank(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Uploading => 1,
            Phase::Extracting => 2,
            Phase::Ready => 3,
            Phase::Generating => 4,
            Phase::Succeeded | Phase::Failed => 5,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Uploading => "uploading",
            Phase::Extracting => "extracting",
            Phase::Ready => "ready",
            Phase::Generating => "generating",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Phase, progress label and last error of a feature instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub phase: Phase,
    pub progress_message: String,
    pub last_error: Option<ErrorInfo>,
}

impl PipelineState {
    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(FlowError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn advance_with(&mut self, next: Phase, progress: impl Into<String>) -> Result<()> {
        self.advance(next)?;
        self.progress_message = progress.into();
        Ok(())
    }

    /// Enter `Failed`, clearing the progress label
    pub fn fail(&mut self, error: &FlowError) -> Result<()> {
        self.advance(Phase::Failed)?;
        self.progress_message.clear();
        self.last_error = Some(error.info());
        Ok(())
    }

    /// Explicit clear back to an input phase (`Idle`, or `Ready` when source text is loaded)
    pub fn clear_to(&mut self, phase: Phase) {
        debug_assert!(matches!(phase, Phase::Idle | Phase::Ready));
        self.phase = phase;
        self.last_error = None;
        if phase == Phase::Idle {
            self.progress_message.clear();
        }
    }

    pub fn reset(&mut self) {
        *self = PipelineState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ingestion_happy_path() {
        let mut state = PipelineState::default();
        state.advance_with(Phase::Uploading, "Uploading notes.pdf").unwrap();
        state.advance_with(Phase::Extracting, "Processing notes.pdf").unwrap();
        state.advance(Phase::Ready).unwrap();
        state.advance(Phase::Generating).unwrap();
        state.advance(Phase::Succeeded).unwrap();
        assert_eq!(state.phase, Phase::Succeeded);
    }

    #[test]
    fn ready_never_reverts_to_uploading() {
        let mut state = PipelineState {
            phase: Phase::Ready,
            ..Default::default()
        };
        let err = state.advance(Phase::Uploading).unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition { .. }));
        assert_eq!(state.phase, Phase::Ready);
    }

    #[test]
    fn generating_only_from_idle_or_ready() {
        for from in Phase::ALL {
            let allowed = from.can_advance_to(Phase::Generating);
            assert_eq!(allowed, matches!(from, Phase::Idle | Phase::Ready), "{from}");
        }
    }

    #[test]
    fn fail_records_error_and_clears_progress() {
        let mut state = PipelineState::default();
        state.advance_with(Phase::Uploading, "Uploading a.pdf").unwrap();
        let err = FlowError::NetworkFailure("connection reset".into());
        state.fail(&err).unwrap();
        assert_eq!(state.phase, Phase::Failed);
        assert!(state.progress_message.is_empty());
        assert_eq!(state.last_error.unwrap().kind, crate::ErrorKind::NetworkFailure);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Advance(Phase),
        Reset,
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            8 => (0..Phase::ALL.len()).prop_map(|i| Event::Advance(Phase::ALL[i])),
            1 => Just(Event::Reset),
        ]
    }

    proptest! {
        #[test]
        fn phases_only_move_forward_between_resets(events in proptest::collection::vec(event(), 0..64)) {
            let mut state = PipelineState::default();
            for event in events {
                let before = state.phase;
                match event {
                    Event::Advance(next) => {
                        if state.advance(next).is_ok() {
                            prop_assert!(state.phase.rank() > before.rank());
                        } else {
                            prop_assert_eq!(state.phase, before);
                        }
                    }
                    Event::Reset => {
                        state.reset();
                        prop_assert_eq!(state.phase, Phase::Idle);
                    }
                }
            }
        }
    }
}
