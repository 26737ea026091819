//! Cycle regenerator: rebuild the downstream path when a loop closes.

use super::WorkflowEngine;
use crate::definition::StateId;
use crate::graph::FrontierWalk;
use crate::instance::{Approval, Transition, TransitionStatus};
use crate::store::{StoreError, StoreSession, TransitionFilter};
use tracing::debug;

impl WorkflowEngine {
    /// Whether completing `done` closed a cycle: the transitions leaving
    /// its destination state have been traversed before (at least one
    /// Done) and none of them is pending — the instance has looped back
    /// with no further plan queued.
    pub(crate) async fn cycled(
        &self,
        session: &mut dyn StoreSession,
        done: &Transition,
    ) -> Result<bool, StoreError> {
        let outgoing = session
            .transitions(&TransitionFilter::default().with_source(done.destination.clone()))
            .await?;
        let has_done = outgoing.iter().any(|t| t.status == TransitionStatus::Done);
        let has_pending = outgoing
            .iter()
            .any(|t| t.status == TransitionStatus::Pending);
        Ok(has_done && !has_pending)
    }

    /// Re-create the reachable downstream template subgraph one hop
    /// deeper: per round, clone the most-recent-iteration image of each
    /// template leaving the frontier — approvals included, decision fields
    /// cleared — skipping (source, destination) pairs already regenerated
    /// in this call.
    pub(crate) async fn recreate_cycled_path(
        &self,
        session: &mut dyn StoreSession,
        done: &Transition,
    ) -> Result<(), StoreError> {
        let mut walk: FrontierWalk<(StateId, StateId)> =
            FrontierWalk::new([done.destination.clone()]);
        let mut cloned = 0usize;
        loop {
            let sources: Vec<StateId> = walk.frontier().iter().cloned().collect();
            let images: Vec<Transition> = session
                .latest_per_template(&sources)
                .await?
                .into_iter()
                .filter(|t| !walk.is_excluded(&(t.source.clone(), t.destination.clone())))
                .collect();
            if images.is_empty() {
                break;
            }

            let iteration = done.iteration + 1 + walk.round();
            for image in &images {
                let regenerated = Transition::next_cycle(image, iteration);
                let regenerated_id = regenerated.id;
                let approvals = session.approvals_of(image.id).await?;
                session.insert_transition(regenerated).await?;
                for approval in &approvals {
                    session
                        .insert_approval(Approval::next_cycle(approval, regenerated_id))
                        .await?;
                }
                cloned += 1;
            }

            walk.advance(
                &images,
                |t| (t.source.clone(), t.destination.clone()),
                |t| t.destination.clone(),
            );
        }

        debug!(
            state = %done.destination,
            transitions = cloned,
            "regenerated cycled path"
        );
        Ok(())
    }
}
