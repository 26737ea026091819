//! Runtime rows — the per-instance materialization of a workflow.
//!
//! Each entity instance gets its own [`Transition`] and [`Approval`] rows,
//! expanded from the workflow definition the first time the instance is
//! touched. Rows accumulate across cycle traversals and are never deleted;
//! the only mutation a row ever sees is the one-way status step
//! `Pending -> {Done, Cancelled, Jumped}` plus the set-once decision fields
//! on approvals.

use crate::definition::{
    ApprovalTemplate, ApprovalTemplateId, Authorization, StateId, TransitionTemplate,
    TransitionTemplateId, WorkflowId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identity of a tracked entity instance: a type tag plus an instance key,
/// so that any entity type can carry a workflow field without a polymorphic
/// foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub key: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.key)
    }
}

/// Scope of one materialized graph: a workflow applied to one entity
/// instance. Every runtime row is tagged with its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub workflow: WorkflowId,
    pub entity: EntityRef,
}

/// An acting principal as seen by the engine: an opaque id plus the
/// permission and group sets the authorization oracle may match against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub permissions: BTreeSet<String>,
    pub groups: BTreeSet<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            permissions: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }
}

/// Entity field protocol: get/set of the tracked state field.
///
/// Persistence of the field goes through the store session so it lands in
/// the same atomic unit as the row changes; the in-memory object is updated
/// through this trait.
pub trait WorkflowEntity: Send {
    fn entity_ref(&self) -> EntityRef;

    /// Current value of the named field, if it has ever been set.
    fn state_of(&self, field_name: &str) -> Option<StateId>;

    fn set_state(&mut self, field_name: &str, state: StateId);
}

/// Unique id of a runtime [`Transition`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(Uuid);

impl TransitionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique id of a runtime [`Approval`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(Uuid);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a transition row. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionStatus {
    Pending,
    Done,
    Cancelled,
    Jumped,
}

impl TransitionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Lifecycle of an approval row. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Cancelled,
    Jumped,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Runtime instance of a transition template for one (workflow, entity).
///
/// `iteration` is the BFS depth from the initial state at creation time and
/// never changes; cycle traversals add new rows for the same template at
/// deeper iterations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub template_id: TransitionTemplateId,
    pub key: InstanceKey,
    pub source: StateId,
    pub destination: StateId,
    pub iteration: u32,
    pub status: TransitionStatus,
}

impl Transition {
    /// Fresh row expanded from a template during materialization.
    pub fn materialize(key: &InstanceKey, template: &TransitionTemplate, iteration: u32) -> Self {
        Self {
            id: TransitionId::generate(),
            template_id: template.id,
            key: key.clone(),
            source: template.source.clone(),
            destination: template.destination.clone(),
            iteration,
            status: TransitionStatus::Pending,
        }
    }

    /// Clone of a prior image one cycle deeper, pending again.
    pub fn next_cycle(image: &Transition, iteration: u32) -> Self {
        Self {
            id: TransitionId::generate(),
            template_id: image.template_id,
            key: image.key.clone(),
            source: image.source.clone(),
            destination: image.destination.clone(),
            iteration,
            status: TransitionStatus::Pending,
        }
    }
}

/// Runtime instance of an approval template, scoped to one transition row.
///
/// `previous` links to the most recent decided approval of the instance at
/// decision time, forming the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub template_id: ApprovalTemplateId,
    pub transition_id: TransitionId,
    pub key: InstanceKey,
    pub priority: u32,
    pub authorization: Authorization,
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub previous: Option<ApprovalId>,
}

impl Approval {
    /// Fresh row expanded from a template during materialization, copying
    /// the authorization predicate.
    pub fn materialize(
        key: &InstanceKey,
        transition_id: TransitionId,
        template: &ApprovalTemplate,
    ) -> Self {
        Self {
            id: ApprovalId::generate(),
            template_id: template.id,
            transition_id,
            key: key.clone(),
            priority: template.priority,
            authorization: template.authorization.clone(),
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            previous: None,
        }
    }

    /// Clone of a prior image for a regenerated transition, decision fields
    /// cleared.
    pub fn next_cycle(image: &Approval, transition_id: TransitionId) -> Self {
        Self {
            id: ApprovalId::generate(),
            template_id: image.template_id,
            transition_id,
            key: image.key.clone(),
            priority: image.priority,
            authorization: image.authorization.clone(),
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            previous: None,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decided_at.is_some()
    }
}
