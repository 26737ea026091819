//! The approve path: decision, completion, advance, signals.

use super::WorkflowEngine;
use crate::definition::{StateId, Workflow};
use crate::error::{EngineError, EngineResult};
use crate::instance::{
    Approval, ApprovalStatus, InstanceKey, Principal, TransitionStatus, WorkflowEntity,
};
use crate::signals::{SignalEvent, SignalKind, SignalPhase};
use crate::store::StoreSession;
use chrono::Utc;
use tracing::debug;

/// What an [`WorkflowEngine::approve`] call did.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The decided approval row.
    pub approval: Approval,
    /// Whether this decision completed its transition and advanced the
    /// entity.
    pub transitioned: bool,
    /// The state advanced to, when `transitioned`.
    pub new_state: Option<StateId>,
    /// Whether the instance now sits on a final state.
    pub completed: bool,
}

impl WorkflowEngine {
    /// Record one approval decision by `principal`, advancing the entity
    /// when the decision completes its transition.
    ///
    /// `next_state` is required when approvals toward more than one
    /// destination are available, and resolves the branch: pending work the
    /// choice makes unreachable is cancelled in the same transaction.
    pub async fn approve(
        &self,
        entity: &mut dyn WorkflowEntity,
        field_name: &str,
        principal: &Principal,
        next_state: Option<StateId>,
    ) -> EngineResult<ApprovalOutcome> {
        let (workflow, key) = self.context(&entity.entity_ref(), field_name).await?;
        let mut session = self.store.begin(&key).await?;
        match self
            .approve_in(
                &workflow,
                &key,
                entity,
                field_name,
                principal,
                next_state,
                session.as_mut(),
            )
            .await
        {
            Ok(outcome) => {
                session.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                let _ = session.rollback().await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn approve_in(
        &self,
        workflow: &Workflow,
        key: &InstanceKey,
        entity: &mut dyn WorkflowEntity,
        field_name: &str,
        principal: &Principal,
        next_state: Option<StateId>,
        session: &mut dyn StoreSession,
    ) -> EngineResult<ApprovalOutcome> {
        self.ensure_materialized(workflow, key, session).await?;

        let current = match entity.state_of(field_name) {
            Some(state) => state,
            None => {
                let initial = workflow.initial_state.clone();
                entity.set_state(field_name, initial.clone());
                initial
            }
        };

        let eligible = self
            .eligible_approvals(workflow, session, principal, &current, None)
            .await?;
        if eligible.is_empty() {
            return Err(EngineError::NoAvailableApproval {
                principal: principal.id.clone(),
            });
        }

        let mut destinations: Vec<StateId> = eligible
            .iter()
            .map(|(_, transition)| transition.destination.clone())
            .collect();
        destinations.sort();
        destinations.dedup();

        if destinations.len() > 1 && next_state.is_none() {
            return Err(EngineError::AmbiguousDestination {
                candidates: destinations,
            });
        }

        let (approval, transition) = match &next_state {
            Some(target) => {
                match eligible
                    .iter()
                    .find(|(_, transition)| &transition.destination == target)
                {
                    Some(entry) => entry.clone(),
                    None => {
                        return Err(EngineError::InvalidDestination {
                            given: target.clone(),
                            valid: destinations,
                        });
                    }
                }
            }
            None => eligible[0].clone(),
        };

        // Decision fields are set once; `previous` chains this decision to
        // the instance's latest one.
        let previous = session.most_recent_decided_approval().await?.map(|a| a.id);
        let decided = session
            .record_approval(approval.id, &principal.id, Utc::now(), previous)
            .await?;

        // A named destination is a branch resolution: cancel what it makes
        // unreachable before checking completion.
        if next_state.is_some() {
            self.cancel_impossible_future(session, &transition).await?;
        }

        let peers = session.approvals_of(transition.id).await?;
        let transitioned = !peers
            .iter()
            .any(|peer| peer.status == ApprovalStatus::Pending);

        if transitioned {
            session
                .set_transitions_status(&[transition.id], TransitionStatus::Done)
                .await?;
            entity.set_state(field_name, transition.destination.clone());
            debug!(
                entity = %key.entity,
                source = %transition.source,
                destination = %transition.destination,
                iteration = transition.iteration,
                "instance advanced"
            );
            if self.cycled(session, &transition).await? {
                self.recreate_cycled_path(session, &transition).await?;
            }
        }

        let state_now = if transitioned {
            transition.destination.clone()
        } else {
            current
        };
        // Computed once, shared by the before and after completion scopes.
        let on_final = workflow.is_final(&state_now);

        let event = |phase, kind, approval: Option<Approval>| SignalEvent {
            phase,
            kind,
            entity: key.entity.clone(),
            field_name: field_name.to_string(),
            approval,
        };

        // Nesting order: approval (outermost) -> transition -> completion.
        self.fire(event(
            SignalPhase::Before,
            SignalKind::Approval,
            Some(decided.clone()),
        ));
        if transitioned {
            self.fire(event(
                SignalPhase::Before,
                SignalKind::Transition,
                Some(decided.clone()),
            ));
        }
        if on_final {
            self.fire(event(SignalPhase::Before, SignalKind::Completion, None));
        }

        session.persist_entity_state(field_name, &state_now).await?;

        if on_final {
            self.fire(event(SignalPhase::After, SignalKind::Completion, None));
        }
        if transitioned {
            self.fire(event(
                SignalPhase::After,
                SignalKind::Transition,
                Some(decided.clone()),
            ));
        }
        self.fire(event(
            SignalPhase::After,
            SignalKind::Approval,
            Some(decided.clone()),
        ));

        Ok(ApprovalOutcome {
            approval: decided,
            transitioned,
            new_state: transitioned.then(|| transition.destination.clone()),
            completed: on_final,
        })
    }
}
