//! Authorization oracle — principal → approvable templates.
//!
//! The engine never evaluates authorization itself; it asks the oracle
//! which approval templates a principal may act on and intersects the
//! answer with the pending rows. Resolution is pure: no side effects are
//! assumed by the core.

use crate::definition::{ApprovalTemplateId, Workflow};
use crate::instance::Principal;
use async_trait::async_trait;
use std::collections::HashSet;

/// Maps a principal to the approval templates they may act on within a
/// workflow.
#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
    async fn resolve(&self, workflow: &Workflow, principal: &Principal)
    -> HashSet<ApprovalTemplateId>;
}

/// Oracle that evaluates each template's own authorization predicate
/// against the permission and group sets the principal carries.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticOracle;

impl StaticOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthorizationOracle for StaticOracle {
    async fn resolve(
        &self,
        workflow: &Workflow,
        principal: &Principal,
    ) -> HashSet<ApprovalTemplateId> {
        workflow
            .templates
            .iter()
            .flat_map(|t| t.approvals.iter())
            .filter(|a| {
                a.authorization
                    .permits(&principal.permissions, &principal.groups)
            })
            .map(|a| a.id)
            .collect()
    }
}
