//! Persistent store seam.
//!
//! The engine never touches rows directly: every mutating operation opens a
//! [`StoreSession`] scoped to one (workflow, entity) instance, performs all
//! of its row changes through it, and commits — or the session rolls back
//! and no observer ever sees a partially advanced graph. Concrete backends
//! implement [`WorkflowStore`]; the crate ships [`InMemoryStore`] as the
//! reference implementation.

mod memory;
mod traits;

pub use memory::InMemoryStore;
pub use traits::{StoreSession, TransitionFilter, WorkflowStore};

use crate::instance::{ApprovalId, ApprovalStatus, TransitionId, TransitionStatus};
use thiserror::Error;

/// Errors surfaced by a store backend. They abort the enclosing
/// transaction and propagate to the caller unchanged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("transition {0} not found")]
    TransitionNotFound(TransitionId),

    #[error("approval {0} not found")]
    ApprovalNotFound(ApprovalId),

    /// Status steps are one-way: only pending rows may move, and only to a
    /// terminal status.
    #[error("illegal transition status change {from:?} -> {to:?} on {id}")]
    IllegalTransitionStatus {
        id: TransitionId,
        from: TransitionStatus,
        to: TransitionStatus,
    },

    /// Same one-way rule for approval rows.
    #[error("illegal approval status change {from:?} -> {to:?} on {id}")]
    IllegalApprovalStatus {
        id: ApprovalId,
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    /// Decision fields are set once.
    #[error("approval {0} has already been decided")]
    AlreadyDecided(ApprovalId),

    #[error("a workflow is already registered for {entity_type}.{field_name}")]
    WorkflowExists {
        entity_type: String,
        field_name: String,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}
