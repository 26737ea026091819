//! Jump controller: administrative skip to a named future pending state.

use super::WorkflowEngine;
use crate::definition::{StateId, Workflow};
use crate::error::{EngineError, EngineResult};
use crate::instance::{
    ApprovalStatus, InstanceKey, TransitionId, TransitionStatus, WorkflowEntity,
};
use crate::store::{StoreSession, TransitionFilter};
use tracing::debug;

impl WorkflowEngine {
    /// Force the instance to `target`, which must appear as the destination
    /// of a pending transition at or after the iteration of the most recent
    /// decided approval. Every pending transition at or before the found
    /// iteration is marked jumped, approvals included. No signal events
    /// fire for this path.
    pub async fn jump_to(
        &self,
        entity: &mut dyn WorkflowEntity,
        field_name: &str,
        target: StateId,
    ) -> EngineResult<()> {
        let (workflow, key) = self.context(&entity.entity_ref(), field_name).await?;
        let mut session = self.store.begin(&key).await?;
        match self
            .jump_in(&workflow, &key, entity, field_name, &target, session.as_mut())
            .await
        {
            Ok(()) => {
                session.commit().await?;
                Ok(())
            }
            Err(err) => {
                let _ = session.rollback().await;
                Err(err)
            }
        }
    }

    async fn jump_in(
        &self,
        workflow: &Workflow,
        key: &InstanceKey,
        entity: &mut dyn WorkflowEntity,
        field_name: &str,
        target: &StateId,
        session: &mut dyn StoreSession,
    ) -> EngineResult<()> {
        self.ensure_materialized(workflow, key, session).await?;

        let recent_iteration = match session.most_recent_decided_approval().await? {
            Some(approval) => session.transition(approval.transition_id).await?.iteration,
            None => 0,
        };

        let candidates = session
            .transitions(
                &TransitionFilter::pending()
                    .with_destination(target.clone())
                    .with_min_iteration(recent_iteration),
            )
            .await?;
        let Some(found) = candidates.into_iter().min_by_key(|t| t.iteration) else {
            return Err(EngineError::StateNotJumpable {
                target: target.clone(),
            });
        };

        let skipped: Vec<TransitionId> = session
            .transitions(&TransitionFilter::pending().with_max_iteration(found.iteration))
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        session
            .set_approvals_status(&skipped, ApprovalStatus::Jumped)
            .await?;
        session
            .set_transitions_status(&skipped, TransitionStatus::Jumped)
            .await?;

        entity.set_state(field_name, target.clone());
        session.persist_entity_state(field_name, target).await?;
        debug!(
            entity = %key.entity,
            target = %target,
            skipped = skipped.len(),
            "jumped instance past pending transitions"
        );
        Ok(())
    }
}
