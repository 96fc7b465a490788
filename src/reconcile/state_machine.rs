use anyhow::{bail, Result};
use serde::Serialize;

/// Lifecycle of a single provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Planning,
    Applying,
    Verifying,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Planning => write!(f, "Planning"),
            RunState::Applying => write!(f, "Applying"),
            RunState::Verifying => write!(f, "Verifying"),
            RunState::Done => write!(f, "Done"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

/// Check if a run state is terminal (no further transitions allowed)
pub fn is_terminal(state: &RunState) -> bool {
    matches!(state, RunState::Done | RunState::Failed)
}

/// Check if a state transition is valid
pub fn is_valid_transition(from: &RunState, to: &RunState) -> bool {
    use RunState::*;

    match (from, to) {
        // Can't transition from terminal states
        (from, _) if is_terminal(from) => false,

        // Happy path
        (Planning, Applying) => true,
        (Applying, Verifying) => true,
        (Verifying, Done) => true,

        // Failure paths: planning errors fail before any provider call;
        // apply can fail outright; verify can end a partially failed run
        (Planning, Failed) => true,
        (Applying, Failed) => true,
        (Verifying, Failed) => true,

        // All other transitions are invalid
        _ => false,
    }
}

/// Validate a state transition and return an error if invalid
pub fn validate_transition(from: &RunState, to: &RunState) -> Result<()> {
    if !is_valid_transition(from, to) {
        bail!("Invalid run state transition from '{}' to '{}'", from, to);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunState::*;

    #[test]
    fn test_terminal_states() {
        assert!(is_terminal(&Done));
        assert!(is_terminal(&Failed));

        assert!(!is_terminal(&Planning));
        assert!(!is_terminal(&Applying));
        assert!(!is_terminal(&Verifying));
    }

    #[test]
    fn test_happy_path() {
        assert!(is_valid_transition(&Planning, &Applying));
        assert!(is_valid_transition(&Applying, &Verifying));
        assert!(is_valid_transition(&Verifying, &Done));
    }

    #[test]
    fn test_failure_paths() {
        // Planning errors fail fast, before any provider mutation
        assert!(is_valid_transition(&Planning, &Failed));
        assert!(is_valid_transition(&Applying, &Failed));
        assert!(is_valid_transition(&Verifying, &Failed));
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!is_valid_transition(&Planning, &Verifying));
        assert!(!is_valid_transition(&Planning, &Done));
        assert!(!is_valid_transition(&Applying, &Done));
    }

    #[test]
    fn test_no_going_back() {
        assert!(!is_valid_transition(&Applying, &Planning));
        assert!(!is_valid_transition(&Verifying, &Applying));
    }

    #[test]
    fn test_terminal_states_no_transitions() {
        assert!(!is_valid_transition(&Done, &Planning));
        assert!(!is_valid_transition(&Done, &Failed));
        assert!(!is_valid_transition(&Failed, &Applying));
        assert!(!is_valid_transition(&Failed, &Done));
    }

    #[test]
    fn test_validate_transition_errors() {
        assert!(validate_transition(&Planning, &Applying).is_ok());
        assert!(validate_transition(&Done, &Applying).is_err());
    }
}
