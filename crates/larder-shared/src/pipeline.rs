//! Per-request pipeline state machine.
//!
//! ```text
//! RECEIVED → RESOLVED → GENERATING → EXTRACTING → VALIDATING → RESPONDING → DONE
//!                            └──────── (fallback-safe failure) ─────┘
//! any non-terminal state → FAILED
//! ```
//!
//! Only the edges above are legal. In particular GENERATING never leads to
//! VALIDATING, so a capability error cannot be validated as empty output.

use crate::error::LarderError;
use crate::validation::ValidationOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Resolved,
    Generating,
    Extracting,
    Validating,
    /// Response being built; outcome decided
    Responding(ValidationOutcome),
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self → next` is a legal edge.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Received, Resolved) => true,
            (Resolved, Generating) => true,
            (Generating, Extracting) => true,
            (Generating, Responding(ValidationOutcome::Fallback)) => true,
            (Extracting, Validating) => true,
            (Validating, Responding(_)) => true,
            (Responding(_), Done) => true,
            _ => false,
        }
    }

    /// `next` if `self → next` is legal, else an internal error.
    pub fn step(self, next: PipelineState) -> Result<PipelineState, LarderError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LarderError::Internal(format!(
                "illegal pipeline transition {} -> {}",
                self, next
            )))
        }
    }

    /// Compact encoding for lock-free sharing with a cancellation watcher.
    pub fn code(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Resolved => 1,
            Self::Generating => 2,
            Self::Extracting => 3,
            Self::Validating => 4,
            Self::Responding(ValidationOutcome::Pass) => 5,
            Self::Responding(ValidationOutcome::Repaired) => 6,
            Self::Responding(ValidationOutcome::Fallback) => 7,
            Self::Done => 8,
            Self::Failed => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Received,
            1 => Self::Resolved,
            2 => Self::Generating,
            3 => Self::Extracting,
            4 => Self::Validating,
            5 => Self::Responding(ValidationOutcome::Pass),
            6 => Self::Responding(ValidationOutcome::Repaired),
            7 => Self::Responding(ValidationOutcome::Fallback),
            8 => Self::Done,
            9 => Self::Failed,
            _ => return None,
        })
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "RECEIVED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Extracting => write!(f, "EXTRACTING"),
            Self::Validating => write!(f, "VALIDATING"),
            Self::Responding(ValidationOutcome::Fallback) => write!(f, "RESPONDING(FALLBACK)"),
            Self::Responding(_) => write!(f, "RESPONDING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [
            Received,
            Resolved,
            Generating,
            Extracting,
            Validating,
            Responding(ValidationOutcome::Pass),
            Done,
        ];
        assert!(path.windows(2).all(|w| w[0].can_transition_to(w[1])));
        assert!(Done.is_terminal());
    }

    #[test]
    fn generating_cannot_skip_to_validating() {
        assert!(!Generating.can_transition_to(Validating));
        assert!(!Generating.can_transition_to(Responding(ValidationOutcome::Pass)));
        assert!(Generating.can_transition_to(Responding(ValidationOutcome::Fallback)));
        assert!(Generating.can_transition_to(Failed));
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
        assert!(Failed.step(Resolved).is_err());
        assert_eq!(Received.step(Failed).unwrap(), Failed);
    }

    #[test]
    fn no_skipping_states() {
        assert!(!Received.can_transition_to(Generating));
        assert!(!Extracting.can_transition_to(Responding(ValidationOutcome::Pass)));
        assert!(!Validating.can_transition_to(Done));
    }

    #[test]
    fn codes_round_trip() {
        for code in 0..10u8 {
            let state = PipelineState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert!(PipelineState::from_code(10).is_none());
    }
}
