//! Graph materializer: template graph → per-instance rows.

use super::WorkflowEngine;
use crate::definition::{TransitionTemplate, TransitionTemplateId, Workflow};
use crate::error::EngineResult;
use crate::graph::FrontierWalk;
use crate::instance::{Approval, InstanceKey, Transition, WorkflowEntity};
use crate::store::{StoreError, StoreSession};
use tracing::debug;

impl WorkflowEngine {
    /// Materialize the instance graph now. Idempotent: a no-op if any
    /// transition row already exists for the instance. The lazy entry
    /// points (`approve`, `jump_to`, the availability reads) call the same
    /// expansion on first use.
    pub async fn materialize(
        &self,
        entity: &dyn WorkflowEntity,
        field_name: &str,
    ) -> EngineResult<()> {
        let (workflow, key) = self.context(&entity.entity_ref(), field_name).await?;
        let mut session = self.store.begin(&key).await?;
        match self
            .ensure_materialized(&workflow, &key, session.as_mut())
            .await
        {
            Ok(()) => {
                session.commit().await?;
                Ok(())
            }
            Err(err) => {
                let _ = session.rollback().await;
                Err(err.into())
            }
        }
    }

    /// Breadth-first expansion over the transition templates, starting at
    /// the templates leaving the initial state (iteration 0). Each template
    /// is processed at most once per call, which bounds the pass to one
    /// forward sweep even when the definition contains cycles.
    pub(crate) async fn ensure_materialized(
        &self,
        workflow: &Workflow,
        key: &InstanceKey,
        session: &mut dyn StoreSession,
    ) -> Result<(), StoreError> {
        if session.has_transitions().await? {
            return Ok(());
        }

        let mut walk: FrontierWalk<TransitionTemplateId> =
            FrontierWalk::new([workflow.initial_state.clone()]);
        let mut created = 0usize;
        loop {
            let batch: Vec<&TransitionTemplate> = workflow
                .templates
                .iter()
                .filter(|t| walk.frontier().contains(&t.source) && !walk.is_excluded(&t.id))
                .collect();
            if batch.is_empty() {
                break;
            }
            for template in &batch {
                let transition = Transition::materialize(key, template, walk.round());
                let transition_id = transition.id;
                session.insert_transition(transition).await?;
                for approval_template in &template.approvals {
                    session
                        .insert_approval(Approval::materialize(key, transition_id, approval_template))
                        .await?;
                }
                created += 1;
            }
            walk.advance(&batch, |t| t.id, |t| t.destination.clone());
        }

        debug!(entity = %key.entity, transitions = created, "materialized instance graph");
        Ok(())
    }
}
