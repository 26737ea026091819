//! Fluent builder for workflow definitions.

use super::{
    ApprovalTemplate, ApprovalTemplateId, Authorization, StateId, TransitionTemplate,
    TransitionTemplateId, Workflow, WorkflowId,
};
use crate::error::DefinitionError;
use std::collections::BTreeSet;

/// Declaration of one approval requirement, consumed by
/// [`WorkflowBuilder::add_transition`].
#[derive(Debug, Clone, Default)]
pub struct ApprovalRule {
    priority: u32,
    authorization: Authorization,
}

impl ApprovalRule {
    pub fn new(priority: u32) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    /// Require one of the listed permissions.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.authorization.permissions.insert(permission.into());
        self
    }

    /// Require membership in one of the listed groups.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.authorization.groups.insert(group.into());
        self
    }
}

/// Builder validating and assembling a [`Workflow`].
///
/// # Example
///
/// ```rust,ignore
/// let workflow = WorkflowBuilder::new("ticket", "status", "open")
///     .add_transition("open", "in_review", vec![ApprovalRule::new(0).permission("review")])
///     .add_transition("in_review", "closed", vec![ApprovalRule::new(0).group("leads")])
///     .build()?;
/// ```
#[derive(Debug)]
pub struct WorkflowBuilder {
    entity_type: String,
    field_name: String,
    initial_state: StateId,
    templates: Vec<TransitionTemplate>,
}

impl WorkflowBuilder {
    pub fn new(
        entity_type: impl Into<String>,
        field_name: impl Into<String>,
        initial_state: impl Into<StateId>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            field_name: field_name.into(),
            initial_state: initial_state.into(),
            templates: Vec::new(),
        }
    }

    /// Add a transition template with its required approvals.
    ///
    /// Approval rules are sorted by priority tier at build time.
    pub fn add_transition(
        mut self,
        source: impl Into<StateId>,
        destination: impl Into<StateId>,
        approvals: Vec<ApprovalRule>,
    ) -> Self {
        let mut approvals: Vec<ApprovalTemplate> = approvals
            .into_iter()
            .map(|rule| ApprovalTemplate {
                id: ApprovalTemplateId::generate(),
                priority: rule.priority,
                authorization: rule.authorization,
            })
            .collect();
        approvals.sort_by_key(|a| a.priority);

        self.templates.push(TransitionTemplate {
            id: TransitionTemplateId::generate(),
            source: source.into(),
            destination: destination.into(),
            approvals,
        });
        self
    }

    /// Validate the declared graph and produce the workflow.
    pub fn build(self) -> Result<Workflow, DefinitionError> {
        if self.templates.is_empty() {
            return Err(DefinitionError::NoTransitions);
        }

        let mut edges: BTreeSet<(StateId, StateId)> = BTreeSet::new();
        for template in &self.templates {
            let edge = (template.source.clone(), template.destination.clone());
            if !edges.insert(edge) {
                return Err(DefinitionError::DuplicateTransition {
                    source_state: template.source.clone(),
                    destination: template.destination.clone(),
                });
            }
            // A transition without approvals would stay pending forever.
            if template.approvals.is_empty() {
                return Err(DefinitionError::NoApprovals {
                    source_state: template.source.clone(),
                    destination: template.destination.clone(),
                });
            }
        }

        Ok(Workflow {
            id: WorkflowId::generate(),
            entity_type: self.entity_type,
            field_name: self.field_name,
            initial_state: self.initial_state,
            templates: self.templates,
        })
    }
}
