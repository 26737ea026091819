//! Typed errors and result alias for the workflow engine.

use crate::definition::StateId;
use crate::store::StoreError;
use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the instance state machine.
///
/// All variants propagate synchronously to the caller; nothing is retried
/// internally. Store failures abort the enclosing transaction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The principal holds no eligible pending approval at the current state.
    #[error("no available approval for principal {principal}")]
    NoAvailableApproval { principal: String },

    /// More than one destination state is reachable; the caller must name one.
    #[error(
        "multiple destination states are available ({}); a destination must be given",
        join_states(.candidates)
    )]
    AmbiguousDestination { candidates: Vec<StateId> },

    /// The named destination is not among the currently valid ones.
    #[error(
        "invalid destination {given}; valid destinations are: {}",
        join_states(.valid)
    )]
    InvalidDestination { given: StateId, valid: Vec<StateId> },

    /// The jump target has no pending transition at or after the last
    /// decided iteration.
    #[error("state {target} is not available to be jumped to for this instance")]
    StateNotJumpable { target: StateId },

    /// No workflow is registered for (entity type, field name).
    #[error("no workflow registered for {entity_type}.{field_name}")]
    WorkflowNotFound {
        entity_type: String,
        field_name: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while building a workflow definition.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("workflow declares no transitions")]
    NoTransitions,

    #[error("duplicate transition {source_state} -> {destination}")]
    DuplicateTransition {
        source_state: StateId,
        destination: StateId,
    },

    #[error("transition {source_state} -> {destination} declares no approvals")]
    NoApprovals {
        source_state: StateId,
        destination: StateId,
    },
}

fn join_states(states: &[StateId]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_destination_enumerates_the_valid_set() {
        let err = EngineError::InvalidDestination {
            given: StateId::new("archived"),
            valid: vec![StateId::new("review"), StateId::new("rejected")],
        };
        let message = err.to_string();
        assert!(message.contains("archived"));
        assert!(message.contains("review, rejected"));
    }

    #[test]
    fn ambiguous_destination_lists_candidates() {
        let err = EngineError::AmbiguousDestination {
            candidates: vec![StateId::new("a"), StateId::new("b")],
        };
        assert!(err.to_string().contains("a, b"));
    }
}
