//! Reachability pruner: cancel pending work a branch choice orphans.

use super::WorkflowEngine;
use crate::graph::FrontierWalk;
use crate::instance::{ApprovalStatus, Transition, TransitionId, TransitionStatus};
use crate::store::{StoreError, StoreSession, TransitionFilter};
use std::collections::HashSet;
use tracing::debug;

impl WorkflowEngine {
    /// Cancel every pending transition of the instance, at or after
    /// `from`'s iteration, that is not forward-reachable from `from`
    /// through pending transitions. Cascades to the approvals of the
    /// cancelled rows. Called only when a principal resolves a
    /// multi-destination branch.
    pub(crate) async fn cancel_impossible_future(
        &self,
        session: &mut dyn StoreSession,
        from: &Transition,
    ) -> Result<(), StoreError> {
        let pending = session.transitions(&TransitionFilter::pending()).await?;

        let mut reachable: HashSet<TransitionId> = HashSet::from([from.id]);
        let mut walk: FrontierWalk<TransitionId> =
            FrontierWalk::new([from.destination.clone()]);
        loop {
            let batch: Vec<&Transition> = pending
                .iter()
                .filter(|t| walk.frontier().contains(&t.source) && !walk.is_excluded(&t.id))
                .collect();
            if batch.is_empty() {
                break;
            }
            for transition in &batch {
                reachable.insert(transition.id);
            }
            walk.advance(&batch, |t| t.id, |t| t.destination.clone());
        }

        let doomed: Vec<TransitionId> = pending
            .iter()
            .filter(|t| t.iteration >= from.iteration && !reachable.contains(&t.id))
            .map(|t| t.id)
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }

        session
            .set_approvals_status(&doomed, ApprovalStatus::Cancelled)
            .await?;
        session
            .set_transitions_status(&doomed, TransitionStatus::Cancelled)
            .await?;
        debug!(
            from = %from.id,
            cancelled = doomed.len(),
            "cancelled pending transitions made unreachable by branch choice"
        );
        Ok(())
    }
}
