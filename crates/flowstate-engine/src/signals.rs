//! Signal sink — before/after events around transitions.
//!
//! Three scopes nest around an approval decision: approval (outermost),
//! transition (when the decision completes its transition), completion
//! (when the instance lands on a final state). Before-events fire prior to
//! the persist, after-events follow it in reverse scope order. Sink
//! failures are logged and never abort or roll back a decision; jumps fire
//! no events at all.

use crate::instance::{Approval, EntityRef};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalPhase {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Approval,
    Transition,
    Completion,
}

/// One event delivered to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub phase: SignalPhase,
    pub kind: SignalKind,
    pub entity: EntityRef,
    pub field_name: String,
    /// The decided approval for approval/transition scopes; completion
    /// events carry none.
    pub approval: Option<Approval>,
}

/// Failure reported by a sink. Logged by the engine, never propagated.
#[derive(Debug, Error)]
#[error("signal sink failure: {0}")]
pub struct SignalError(pub String);

/// Receiver for workflow events.
pub trait SignalSink: Send + Sync {
    fn emit(&self, event: &SignalEvent) -> Result<(), SignalError>;
}

/// Sink that discards everything. The engine default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl SignalSink for NoopSink {
    fn emit(&self, _event: &SignalEvent) -> Result<(), SignalError> {
        Ok(())
    }
}

/// Sink that records every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SignalEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SignalEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// (phase, kind) pairs in emission order.
    pub fn sequence(&self) -> Vec<(SignalPhase, SignalKind)> {
        self.events().iter().map(|e| (e.phase, e.kind)).collect()
    }
}

impl SignalSink for RecordingSink {
    fn emit(&self, event: &SignalEvent) -> Result<(), SignalError> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}
