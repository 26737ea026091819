//! Instance state machine.
//!
//! [`WorkflowEngine`] is the sole mutator of runtime rows and of the
//! entity's tracked field. It materializes the per-instance graph lazily,
//! advances the state as approvals complete, prunes branches a decision
//! makes unreachable, regenerates the path when a cycle closes and applies
//! administrative jumps. Every mutating operation runs inside one store
//! session: all row changes commit together or none do.

mod approve;
mod cycle;
mod jump;
mod materialize;
mod prune;

pub use approve::ApprovalOutcome;

use crate::authorize::AuthorizationOracle;
use crate::definition::{StateId, Workflow, WorkflowId};
use crate::error::{EngineError, EngineResult};
use crate::instance::{
    Approval, ApprovalStatus, EntityRef, InstanceKey, Principal, Transition, WorkflowEntity,
};
use crate::signals::{NoopSink, SignalEvent, SignalSink};
use crate::store::{StoreSession, TransitionFilter, WorkflowStore};
use std::sync::Arc;
use tracing::warn;

/// The workflow engine: store, authorization oracle and signal sink wired
/// together.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    oracle: Arc<dyn AuthorizationOracle>,
    sink: Arc<dyn SignalSink>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, oracle: Arc<dyn AuthorizationOracle>) -> Self {
        Self {
            store,
            oracle,
            sink: Arc::new(NoopSink),
        }
    }

    /// Replace the default no-op sink.
    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Register a workflow definition with the underlying store.
    pub async fn register(&self, workflow: Workflow) -> EngineResult<WorkflowId> {
        Ok(self.store.register_workflow(workflow).await?)
    }

    /// Current value of the tracked field; the initial state if the field
    /// has never been set.
    pub async fn current_state(
        &self,
        entity: &dyn WorkflowEntity,
        field_name: &str,
    ) -> EngineResult<StateId> {
        let (workflow, _) = self.context(&entity.entity_ref(), field_name).await?;
        Ok(entity
            .state_of(field_name)
            .unwrap_or_else(|| workflow.initial_state.clone()))
    }

    pub async fn is_on_initial_state(
        &self,
        entity: &dyn WorkflowEntity,
        field_name: &str,
    ) -> EngineResult<bool> {
        let (workflow, _) = self.context(&entity.entity_ref(), field_name).await?;
        let current = entity
            .state_of(field_name)
            .unwrap_or_else(|| workflow.initial_state.clone());
        Ok(current == workflow.initial_state)
    }

    pub async fn is_on_final_state(
        &self,
        entity: &dyn WorkflowEntity,
        field_name: &str,
    ) -> EngineResult<bool> {
        let (workflow, _) = self.context(&entity.entity_ref(), field_name).await?;
        let current = entity
            .state_of(field_name)
            .unwrap_or_else(|| workflow.initial_state.clone());
        Ok(workflow.is_final(&current))
    }

    /// Pending approvals the principal may act on: the oracle's answer
    /// intersected with the pending rows at the current state, or — when a
    /// destination is given — with the pending rows toward that state.
    pub async fn available_approvals(
        &self,
        entity: &dyn WorkflowEntity,
        field_name: &str,
        principal: &Principal,
        destination: Option<&StateId>,
    ) -> EngineResult<Vec<Approval>> {
        let (workflow, key) = self.context(&entity.entity_ref(), field_name).await?;
        let mut session = self.store.begin(&key).await?;
        let result = async {
            self.ensure_materialized(&workflow, &key, session.as_mut())
                .await?;
            let current = entity
                .state_of(field_name)
                .unwrap_or_else(|| workflow.initial_state.clone());
            let eligible = self
                .eligible_approvals(&workflow, session.as_mut(), principal, &current, destination)
                .await?;
            Ok::<_, EngineError>(eligible.into_iter().map(|(approval, _)| approval).collect())
        }
        .await;
        match result {
            Ok(approvals) => {
                session.commit().await?;
                Ok(approvals)
            }
            Err(err) => {
                let _ = session.rollback().await;
                Err(err)
            }
        }
    }

    /// Destination states currently reachable by the principal, sorted.
    pub async fn available_states(
        &self,
        entity: &dyn WorkflowEntity,
        field_name: &str,
        principal: &Principal,
    ) -> EngineResult<Vec<StateId>> {
        let (workflow, key) = self.context(&entity.entity_ref(), field_name).await?;
        let mut session = self.store.begin(&key).await?;
        let result = async {
            self.ensure_materialized(&workflow, &key, session.as_mut())
                .await?;
            let current = entity
                .state_of(field_name)
                .unwrap_or_else(|| workflow.initial_state.clone());
            let eligible = self
                .eligible_approvals(&workflow, session.as_mut(), principal, &current, None)
                .await?;
            let mut states: Vec<StateId> = eligible
                .into_iter()
                .map(|(_, transition)| transition.destination)
                .collect();
            states.sort();
            states.dedup();
            Ok::<_, EngineError>(states)
        }
        .await;
        match result {
            Ok(states) => {
                session.commit().await?;
                Ok(states)
            }
            Err(err) => {
                let _ = session.rollback().await;
                Err(err)
            }
        }
    }

    pub(crate) async fn context(
        &self,
        entity_ref: &EntityRef,
        field_name: &str,
    ) -> EngineResult<(Arc<Workflow>, InstanceKey)> {
        let workflow = self
            .store
            .workflow_by_field(&entity_ref.entity_type, field_name)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound {
                entity_type: entity_ref.entity_type.clone(),
                field_name: field_name.to_string(),
            })?;
        let key = InstanceKey {
            workflow: workflow.id,
            entity: entity_ref.clone(),
        };
        Ok((workflow, key))
    }

    /// Eligible (approval, transition) pairs, ordered by priority tier then
    /// iteration.
    pub(crate) async fn eligible_approvals(
        &self,
        workflow: &Workflow,
        session: &mut dyn StoreSession,
        principal: &Principal,
        current: &StateId,
        destination: Option<&StateId>,
    ) -> EngineResult<Vec<(Approval, Transition)>> {
        let allowed = self.oracle.resolve(workflow, principal).await;
        let filter = match destination {
            Some(target) => TransitionFilter::pending().with_destination(target.clone()),
            None => TransitionFilter::pending().with_source(current.clone()),
        };
        let transitions = session.transitions(&filter).await?;
        let mut eligible = Vec::new();
        for transition in transitions {
            for approval in session.approvals_of(transition.id).await? {
                if approval.status == ApprovalStatus::Pending
                    && allowed.contains(&approval.template_id)
                {
                    eligible.push((approval, transition.clone()));
                }
            }
        }
        eligible.sort_by_key(|(approval, transition)| (approval.priority, transition.iteration));
        Ok(eligible)
    }

    /// Deliver a signal event; sink failures never abort a decision.
    pub(crate) fn fire(&self, event: SignalEvent) {
        if let Err(err) = self.sink.emit(&event) {
            warn!(
                kind = ?event.kind,
                phase = ?event.phase,
                entity = %event.entity,
                error = %err,
                "signal sink failed; continuing"
            );
        }
    }
}
