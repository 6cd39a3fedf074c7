//! Flow lifecycle notifications.
//!
//! Observers are called synchronously on the executing task and must be
//! cheap: a progress update gates the next statement. The model reference
//! is read-only; checkpointing layers clone what they need.

use crate::types::FlowModel;

pub trait FlowObserver: Send + Sync {
    /// Fired after every top-level statement, success or failure.
    fn on_progress(&self, _flow: &FlowModel) {}

    /// Fired once when the statement list is exhausted without an early
    /// return.
    fn on_complete(&self, _flow: &FlowModel) {}

    /// Fired once when a `return` statement executes, instead of
    /// `on_complete`.
    fn on_early_return(&self, _flow: &FlowModel) {}
}

/// Observer that ignores every notification.
pub struct NullObserver;

impl FlowObserver for NullObserver {}
