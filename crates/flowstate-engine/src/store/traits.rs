//! Store traits: workflow registry plus per-instance transactional sessions.

use super::StoreError;
use crate::definition::{StateId, Workflow, WorkflowId};
use crate::instance::{
    Approval, ApprovalId, ApprovalStatus, InstanceKey, Transition, TransitionId, TransitionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Row predicate for transition queries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionFilter {
    pub status: Option<TransitionStatus>,
    pub source: Option<StateId>,
    pub destination: Option<StateId>,
    pub min_iteration: Option<u32>,
    pub max_iteration: Option<u32>,
}

impl TransitionFilter {
    /// Filter matching all pending rows.
    pub fn pending() -> Self {
        Self {
            status: Some(TransitionStatus::Pending),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: StateId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: StateId) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_min_iteration(mut self, iteration: u32) -> Self {
        self.min_iteration = Some(iteration);
        self
    }

    pub fn with_max_iteration(mut self, iteration: u32) -> Self {
        self.max_iteration = Some(iteration);
        self
    }

    pub fn matches(&self, row: &Transition) -> bool {
        self.status.is_none_or(|s| row.status == s)
            && self.source.as_ref().is_none_or(|s| &row.source == s)
            && self
                .destination
                .as_ref()
                .is_none_or(|d| &row.destination == d)
            && self.min_iteration.is_none_or(|i| row.iteration >= i)
            && self.max_iteration.is_none_or(|i| row.iteration <= i)
    }
}

/// Registry of workflow definitions plus the entry point into per-instance
/// transactions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Register a definition. Fails if the (entity type, field name) pair
    /// is already taken.
    async fn register_workflow(&self, workflow: Workflow) -> Result<WorkflowId, StoreError>;

    async fn workflow(&self, id: WorkflowId) -> Result<Option<Arc<Workflow>>, StoreError>;

    /// Lookup by the unique (entity type, field name) pair.
    async fn workflow_by_field(
        &self,
        entity_type: &str,
        field_name: &str,
    ) -> Result<Option<Arc<Workflow>>, StoreError>;

    /// Open a transaction over the rows of one instance. The session holds
    /// whatever locks the backend needs to serialize concurrent mutators of
    /// the same instance; dropping it without committing rolls back.
    async fn begin(&self, key: &InstanceKey) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// One atomic unit of row reads and writes, scoped to a single instance.
///
/// All row changes made through a session become visible to other sessions
/// only after [`commit`](StoreSession::commit).
#[async_trait]
pub trait StoreSession: Send {
    /// Whether any transition row exists for the instance (materialization
    /// no-op check).
    async fn has_transitions(&mut self) -> Result<bool, StoreError>;

    async fn insert_transition(&mut self, row: Transition) -> Result<(), StoreError>;

    async fn insert_approval(&mut self, row: Approval) -> Result<(), StoreError>;

    async fn transition(&mut self, id: TransitionId) -> Result<Transition, StoreError>;

    /// Transitions of the instance matching the filter, in insertion order.
    async fn transitions(&mut self, filter: &TransitionFilter)
    -> Result<Vec<Transition>, StoreError>;

    /// All approvals of one transition row, in insertion order.
    async fn approvals_of(&mut self, transition: TransitionId)
    -> Result<Vec<Approval>, StoreError>;

    /// One-way bulk status update on transition rows.
    async fn set_transitions_status(
        &mut self,
        ids: &[TransitionId],
        status: TransitionStatus,
    ) -> Result<(), StoreError>;

    /// One-way bulk status update on the *pending* approvals of the given
    /// transitions (cascade for cancel/jump).
    async fn set_approvals_status(
        &mut self,
        transitions: &[TransitionId],
        status: ApprovalStatus,
    ) -> Result<(), StoreError>;

    /// Record a decision: set the approval approved with its principal,
    /// timestamp and audit-chain link. Decision fields are set once.
    async fn record_approval(
        &mut self,
        id: ApprovalId,
        decided_by: &str,
        decided_at: DateTime<Utc>,
        previous: Option<ApprovalId>,
    ) -> Result<Approval, StoreError>;

    /// Most recently decided approval of the instance (by timestamp), if
    /// any decision has been taken.
    async fn most_recent_decided_approval(&mut self) -> Result<Option<Approval>, StoreError>;

    /// Most-recent-iteration transition row per template id, over rows
    /// whose source is in the given set (cycle regeneration images).
    async fn latest_per_template(
        &mut self,
        sources: &[StateId],
    ) -> Result<Vec<Transition>, StoreError>;

    /// Write-through of the entity's tracked field value.
    async fn persist_entity_state(
        &mut self,
        field_name: &str,
        state: &StateId,
    ) -> Result<(), StoreError>;

    /// Last persisted value of the tracked field, if any.
    async fn persisted_entity_state(
        &mut self,
        field_name: &str,
    ) -> Result<Option<StateId>, StoreError>;

    /// Make the session's changes visible and release its locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard the session's changes. Dropping without commit has the same
    /// effect.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
