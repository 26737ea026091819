//! In-memory store backend.
//!
//! The reference implementation of [`WorkflowStore`]: rows live in process
//! memory, and a session takes an exclusive async lock over its instance's
//! rows for its whole lifetime. That lock is the in-memory equivalent of
//! store-level row locking — concurrent mutators of the same instance
//! serialize on it, so the "no sibling approval left pending" check can
//! never double-fire. An undo snapshot taken at `begin` is restored if the
//! session is dropped without commit.

use super::{StoreError, StoreSession, TransitionFilter, WorkflowStore};
use crate::definition::{StateId, TransitionTemplateId, Workflow, WorkflowId};
use crate::instance::{
    Approval, ApprovalId, ApprovalStatus, InstanceKey, Transition, TransitionId, TransitionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

/// Rows of one (workflow, entity) instance.
#[derive(Debug, Clone, Default)]
struct InstanceRows {
    transitions: Vec<Transition>,
    approvals: Vec<Approval>,
    entity_fields: HashMap<String, StateId>,
}

/// In-memory [`WorkflowStore`].
#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<WorkflowId, Arc<Workflow>>>,
    by_field: RwLock<HashMap<(String, String), WorkflowId>>,
    instances: Mutex<HashMap<InstanceKey, Arc<AsyncMutex<InstanceRows>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn instance_rows(&self, key: &InstanceKey) -> Arc<AsyncMutex<InstanceRows>> {
        let mut instances = self
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        instances.entry(key.clone()).or_default().clone()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn register_workflow(&self, workflow: Workflow) -> Result<WorkflowId, StoreError> {
        let field_key = (workflow.entity_type.clone(), workflow.field_name.clone());
        let mut by_field = self.by_field.write().await;
        if by_field.contains_key(&field_key) {
            return Err(StoreError::WorkflowExists {
                entity_type: field_key.0,
                field_name: field_key.1,
            });
        }
        let id = workflow.id;
        by_field.insert(field_key, id);
        self.workflows.write().await.insert(id, Arc::new(workflow));
        Ok(id)
    }

    async fn workflow(&self, id: WorkflowId) -> Result<Option<Arc<Workflow>>, StoreError> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn workflow_by_field(
        &self,
        entity_type: &str,
        field_name: &str,
    ) -> Result<Option<Arc<Workflow>>, StoreError> {
        let by_field = self.by_field.read().await;
        let Some(id) = by_field.get(&(entity_type.to_string(), field_name.to_string())) else {
            return Ok(None);
        };
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn begin(&self, key: &InstanceKey) -> Result<Box<dyn StoreSession>, StoreError> {
        let rows = self.instance_rows(key);
        let guard = rows.lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemorySession {
            guard,
            snapshot,
            committed: false,
        }))
    }
}

/// Session over one instance's rows: exclusive guard + undo snapshot.
struct MemorySession {
    guard: OwnedMutexGuard<InstanceRows>,
    snapshot: InstanceRows,
    committed: bool,
}

impl MemorySession {
    fn transition_mut(&mut self, id: TransitionId) -> Result<&mut Transition, StoreError> {
        self.guard
            .transitions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::TransitionNotFound(id))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.committed {
            *self.guard = std::mem::take(&mut self.snapshot);
        }
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn has_transitions(&mut self) -> Result<bool, StoreError> {
        Ok(!self.guard.transitions.is_empty())
    }

    async fn insert_transition(&mut self, row: Transition) -> Result<(), StoreError> {
        self.guard.transitions.push(row);
        Ok(())
    }

    async fn insert_approval(&mut self, row: Approval) -> Result<(), StoreError> {
        self.guard.approvals.push(row);
        Ok(())
    }

    async fn transition(&mut self, id: TransitionId) -> Result<Transition, StoreError> {
        self.guard
            .transitions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::TransitionNotFound(id))
    }

    async fn transitions(
        &mut self,
        filter: &TransitionFilter,
    ) -> Result<Vec<Transition>, StoreError> {
        Ok(self
            .guard
            .transitions
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn approvals_of(
        &mut self,
        transition: TransitionId,
    ) -> Result<Vec<Approval>, StoreError> {
        Ok(self
            .guard
            .approvals
            .iter()
            .filter(|a| a.transition_id == transition)
            .cloned()
            .collect())
    }

    async fn set_transitions_status(
        &mut self,
        ids: &[TransitionId],
        status: TransitionStatus,
    ) -> Result<(), StoreError> {
        for &id in ids {
            let row = self.transition_mut(id)?;
            if row.status.is_terminal() || !status.is_terminal() {
                return Err(StoreError::IllegalTransitionStatus {
                    id,
                    from: row.status,
                    to: status,
                });
            }
            row.status = status;
        }
        Ok(())
    }

    async fn set_approvals_status(
        &mut self,
        transitions: &[TransitionId],
        status: ApprovalStatus,
    ) -> Result<(), StoreError> {
        for approval in self.guard.approvals.iter_mut() {
            if approval.status == ApprovalStatus::Pending
                && transitions.contains(&approval.transition_id)
            {
                approval.status = status;
            }
        }
        Ok(())
    }

    async fn record_approval(
        &mut self,
        id: ApprovalId,
        decided_by: &str,
        decided_at: DateTime<Utc>,
        previous: Option<ApprovalId>,
    ) -> Result<Approval, StoreError> {
        let approval = self
            .guard
            .approvals
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::ApprovalNotFound(id))?;
        if approval.is_decided() {
            return Err(StoreError::AlreadyDecided(id));
        }
        if approval.status != ApprovalStatus::Pending {
            return Err(StoreError::IllegalApprovalStatus {
                id,
                from: approval.status,
                to: ApprovalStatus::Approved,
            });
        }
        approval.status = ApprovalStatus::Approved;
        approval.decided_by = Some(decided_by.to_string());
        approval.decided_at = Some(decided_at);
        approval.previous = previous;
        Ok(approval.clone())
    }

    async fn most_recent_decided_approval(&mut self) -> Result<Option<Approval>, StoreError> {
        // max_by_key keeps the last of equal timestamps, i.e. the most
        // recently inserted row.
        Ok(self
            .guard
            .approvals
            .iter()
            .filter(|a| a.is_decided())
            .max_by_key(|a| a.decided_at)
            .cloned())
    }

    async fn latest_per_template(
        &mut self,
        sources: &[StateId],
    ) -> Result<Vec<Transition>, StoreError> {
        let mut best: HashMap<TransitionTemplateId, Transition> = HashMap::new();
        for row in &self.guard.transitions {
            if !sources.contains(&row.source) {
                continue;
            }
            match best.get(&row.template_id) {
                Some(current) if current.iteration > row.iteration => {}
                _ => {
                    best.insert(row.template_id, row.clone());
                }
            }
        }
        let mut images: Vec<Transition> = best.into_values().collect();
        images.sort_by(|a, b| {
            (a.iteration, a.source.as_str(), a.destination.as_str()).cmp(&(
                b.iteration,
                b.source.as_str(),
                b.destination.as_str(),
            ))
        });
        Ok(images)
    }

    async fn persist_entity_state(
        &mut self,
        field_name: &str,
        state: &StateId,
    ) -> Result<(), StoreError> {
        self.guard
            .entity_fields
            .insert(field_name.to_string(), state.clone());
        Ok(())
    }

    async fn persisted_entity_state(
        &mut self,
        field_name: &str,
    ) -> Result<Option<StateId>, StoreError> {
        Ok(self.guard.entity_fields.get(field_name).cloned())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        // Drop restores the snapshot while `committed` is still false.
        self.committed = false;
        Ok(())
    }
}
