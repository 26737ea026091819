//! Flowstate Engine — approval-gated workflow state machine.
//!
//! A [`definition::Workflow`] declares a graph of states and transition
//! templates (each requiring one or more approvals) for one tracked field
//! of one entity type. Per entity instance, the engine materializes the
//! template graph into concrete pending [`instance::Transition`] and
//! [`instance::Approval`] rows, advances the entity's state as approvals
//! complete, supports cycles (revisiting earlier states regenerates the
//! future path), administrative jumps to a future pending state, and prunes
//! work a branch decision makes unreachable.
//!
//! External collaborators sit behind trait seams: the transactional
//! [`store::WorkflowStore`], the [`authorize::AuthorizationOracle`] and the
//! [`signals::SignalSink`].

// definition module: the static graph
pub mod definition;
pub use definition::*;

// instance module: per-entity runtime rows
pub mod instance;
pub use instance::*;

// error module
pub mod error;
pub use error::*;

// store seam + in-memory backend
pub mod store;
pub use store::*;

// authorization oracle seam
pub mod authorize;
pub use authorize::*;

// signal sink seam
pub mod signals;
pub use signals::*;

// shared frontier-expansion helper
mod graph;

// the instance state machine
pub mod engine;
pub use engine::*;
