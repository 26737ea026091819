//! Flowstate Testing
//!
//! Shared fixtures for exercising the workflow engine end to end: a ticket
//! entity, a realistic review workflow, canned principals and a harness
//! wiring the in-memory store, the static oracle and a recording sink.

use async_trait::async_trait;
use flowstate_engine::{
    ApprovalRule, ApprovalTemplateId, AuthorizationOracle, EngineResult, EntityRef, InMemoryStore,
    InstanceKey, Principal, RecordingSink, StateId, Workflow, WorkflowBuilder, WorkflowEngine,
    WorkflowEntity,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Install a fmt subscriber for test output. Safe to call from every test;
/// only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A tracked entity with an open-ended field map, standing in for whatever
/// domain object carries the workflow field.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub key: String,
    fields: HashMap<String, StateId>,
}

impl Ticket {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: HashMap::new(),
        }
    }
}

impl WorkflowEntity for Ticket {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new("ticket", self.key.clone())
    }

    fn state_of(&self, field_name: &str) -> Option<StateId> {
        self.fields.get(field_name).cloned()
    }

    fn set_state(&mut self, field_name: &str, state: StateId) {
        self.fields.insert(field_name.to_string(), state);
    }
}

/// A review workflow with a two-tier gate, a branch and a reopen cycle:
///
/// ```text
/// open -> in_review          (reviewer tier, then leads tier)
/// in_review -> approved      (leads)
/// in_review -> rejected      (leads)
/// approved -> released       (releaser)       final
/// rejected -> open           (reviewer)       closes the cycle
/// ```
pub fn review_workflow() -> Workflow {
    WorkflowBuilder::new("ticket", "status", "open")
        .add_transition(
            "open",
            "in_review",
            vec![
                ApprovalRule::new(0).permission("ticket.review"),
                ApprovalRule::new(1).group("leads"),
            ],
        )
        .add_transition("in_review", "approved", vec![ApprovalRule::new(0).group("leads")])
        .add_transition("in_review", "rejected", vec![ApprovalRule::new(0).group("leads")])
        .add_transition(
            "approved",
            "released",
            vec![ApprovalRule::new(0).permission("ticket.release")],
        )
        .add_transition("rejected", "open", vec![ApprovalRule::new(0).permission("ticket.review")])
        .build()
        .expect("fixture workflow is valid")
}

pub fn reviewer() -> Principal {
    Principal::new("riley").with_permission("ticket.review")
}

pub fn lead() -> Principal {
    Principal::new("lena").with_group("leads")
}

pub fn releaser() -> Principal {
    Principal::new("rhea").with_permission("ticket.release")
}

pub fn outsider() -> Principal {
    Principal::new("mallory")
}

/// Oracle that authorizes nothing, for exercising the oracle seam.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllOracle;

#[async_trait]
impl AuthorizationOracle for DenyAllOracle {
    async fn resolve(&self, _workflow: &Workflow, _principal: &Principal) -> HashSet<ApprovalTemplateId> {
        HashSet::new()
    }
}

/// Engine, store and sink wired together around one registered workflow.
pub struct Harness {
    pub engine: Arc<WorkflowEngine>,
    pub store: Arc<InMemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub key: InstanceKey,
}

impl Harness {
    /// Register `workflow` on a fresh store; `entity_key` scopes [`Self::key`].
    pub async fn new(workflow: Workflow, entity_key: &str) -> EngineResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let engine = Arc::new(
            WorkflowEngine::new(store.clone(), Arc::new(flowstate_engine::StaticOracle::new()))
                .with_sink(sink.clone()),
        );
        let id = engine.register(workflow).await?;
        Ok(Self {
            engine,
            store,
            sink,
            key: InstanceKey {
                workflow: id,
                entity: EntityRef::new("ticket", entity_key),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_workflow_has_one_final_state() {
        let workflow = review_workflow();
        assert_eq!(workflow.final_states(), [StateId::new("released")].into());
        assert!(workflow.is_final(&StateId::new("released")));
        assert!(!workflow.is_final(&StateId::new("open")));
    }

    #[test]
    fn workflow_definition_survives_serialization() {
        let workflow = review_workflow();
        let json = serde_json::to_string(&workflow).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, workflow);
    }
}
