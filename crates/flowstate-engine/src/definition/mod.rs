//! Workflow definitions — the static graph.
//!
//! A [`Workflow`] declares the states and approval-gated transitions for one
//! tracked field of one entity type. Definitions are built once through the
//! [`WorkflowBuilder`] and are read-only for the rest of their life; runtime
//! rows are materialized from them per entity instance (see
//! [`crate::instance`]).

mod builder;

pub use builder::{ApprovalRule, WorkflowBuilder};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identity of a node in the workflow graph.
///
/// States are compared by label; two workflows may reuse the same labels
/// without interfering because runtime rows are scoped by workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(String);

impl StateId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Unique id of a registered [`Workflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique id of a [`TransitionTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionTemplateId(Uuid);

impl TransitionTemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransitionTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique id of an [`ApprovalTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalTemplateId(Uuid);

impl ApprovalTemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ApprovalTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authorization predicate carried by an approval template and copied onto
/// every materialized approval row.
///
/// An empty set places no constraint of that kind: a fully empty predicate
/// is approvable by any principal the oracle admits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub permissions: BTreeSet<String>,
    pub groups: BTreeSet<String>,
}

impl Authorization {
    /// A predicate with no constraints.
    pub fn open() -> Self {
        Self::default()
    }

    /// Whether a principal holding the given permission and group sets
    /// satisfies this predicate: each non-empty constraint set must
    /// intersect the corresponding principal set.
    pub fn permits(&self, permissions: &BTreeSet<String>, groups: &BTreeSet<String>) -> bool {
        let permission_ok =
            self.permissions.is_empty() || !self.permissions.is_disjoint(permissions);
        let group_ok = self.groups.is_empty() || !self.groups.is_disjoint(groups);
        permission_ok && group_ok
    }
}

/// Design-time declaration of one required approval on a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTemplate {
    pub id: ApprovalTemplateId,
    /// Priority tier; lower tiers are offered first when several approvals
    /// of the same transition are eligible. Completion does not enforce
    /// tier ordering.
    pub priority: u32,
    pub authorization: Authorization,
}

/// Design-time edge of the workflow graph.
///
/// Unique per (workflow, source, destination); owns its approval templates
/// ordered by priority tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTemplate {
    pub id: TransitionTemplateId,
    pub source: StateId,
    pub destination: StateId,
    pub approvals: Vec<ApprovalTemplate>,
}

/// A declared workflow: the (states, transition templates, initial state)
/// graph for one field of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    /// Type tag of the entities this workflow tracks.
    pub entity_type: String,
    /// Name of the tracked field on those entities.
    pub field_name: String,
    pub initial_state: StateId,
    pub templates: Vec<TransitionTemplate>,
}

impl Workflow {
    /// Templates whose source is the given state.
    pub fn templates_from<'a>(
        &'a self,
        source: &'a StateId,
    ) -> impl Iterator<Item = &'a TransitionTemplate> {
        self.templates.iter().filter(move |t| &t.source == source)
    }

    pub fn template(&self, id: TransitionTemplateId) -> Option<&TransitionTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Every state mentioned by the graph, initial state included.
    pub fn states(&self) -> BTreeSet<StateId> {
        let mut states: BTreeSet<StateId> = self
            .templates
            .iter()
            .flat_map(|t| [t.source.clone(), t.destination.clone()])
            .collect();
        states.insert(self.initial_state.clone());
        states
    }

    /// States with no outgoing transition template.
    pub fn final_states(&self) -> BTreeSet<StateId> {
        self.states()
            .into_iter()
            .filter(|s| self.templates_from(s).next().is_none())
            .collect()
    }

    pub fn is_final(&self, state: &StateId) -> bool {
        self.templates_from(state).next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn open_authorization_permits_anyone() {
        let auth = Authorization::open();
        assert!(auth.permits(&BTreeSet::new(), &BTreeSet::new()));
        assert!(auth.permits(&sets(&["p"]), &sets(&["g"])));
    }

    #[test]
    fn permission_constraint_must_intersect() {
        let auth = Authorization {
            permissions: sets(&["review"]),
            groups: BTreeSet::new(),
        };
        assert!(auth.permits(&sets(&["review", "other"]), &BTreeSet::new()));
        assert!(!auth.permits(&sets(&["other"]), &BTreeSet::new()));
    }

    #[test]
    fn both_constraints_apply() {
        let auth = Authorization {
            permissions: sets(&["review"]),
            groups: sets(&["leads"]),
        };
        assert!(auth.permits(&sets(&["review"]), &sets(&["leads"])));
        assert!(!auth.permits(&sets(&["review"]), &sets(&["devs"])));
        assert!(!auth.permits(&sets(&["publish"]), &sets(&["leads"])));
    }

    #[test]
    fn final_states_have_no_outgoing_edge() {
        let workflow = WorkflowBuilder::new("doc", "status", "open")
            .add_transition("open", "review", vec![ApprovalRule::new(0)])
            .add_transition("review", "closed", vec![ApprovalRule::new(0)])
            .build()
            .unwrap();

        assert_eq!(workflow.final_states(), [StateId::new("closed")].into());
        assert!(workflow.is_final(&StateId::new("closed")));
        assert!(!workflow.is_final(&StateId::new("open")));
    }
}
