//! Flow executor.
//!
//! Interprets a parsed [`FlowModel`] statement by statement. Each flow runs
//! on its own task and owns its variable table; the shared registry only
//! carries cancellation handles. The driver blocks on every handler
//! invocation, so execution within one flow is strictly sequential.

mod expressions;
mod statements;

pub mod handler;
pub mod observer;
pub mod registry;

#[cfg(test)]
mod tests;

pub use handler::{EchoHandler, StepHandler, StepOutcome};
pub use observer::{FlowObserver, NullObserver};
pub use registry::FlowRegistry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::error::{FlowError, Result};
use crate::types::{FlowModel, Statement, StatementKind, StatementStatus};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Per-statement control outcome, threaded back to the driver loop.
pub(crate) enum Control {
    /// Statement completed; advance.
    Next,
    /// Statement failed under `err_continue`; advance anyway.
    NextFailedContinue,
    /// A `return` executed; stop the flow via the early-return path.
    Halt,
}

#[derive(Clone)]
pub struct Executor {
    pub(crate) handler: Arc<dyn StepHandler>,
    pub(crate) observer: Arc<dyn FlowObserver>,
    pub(crate) registry: FlowRegistry,
    pub(crate) retry_backoff: Duration,
    pub(crate) default_timeout_ms: Option<u64>,
}

impl Executor {
    pub fn new(handler: Arc<dyn StepHandler>) -> Self {
        Self {
            handler,
            observer: Arc::new(NullObserver),
            registry: FlowRegistry::new(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            default_timeout_ms: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Base duration of the linear retry backoff (attempt N sleeps N times
    /// this).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Deadline applied to handler calls that carry no `timeout` metadata
    /// of their own.
    pub fn with_default_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    /// Request cancellation of a running flow by id.
    pub fn stop(&self, flow_id: &str) -> Result<()> {
        self.registry.stop(flow_id)
    }

    /// Execute the flow to completion, early return, failure, or
    /// cancellation. The model is mutated in place: statement statuses,
    /// timestamps, and the variable table carry the full execution record.
    #[instrument(name = "flow_start", skip_all, fields(flow_id = %flow.flow_id))]
    pub async fn start(&self, flow: &mut FlowModel) -> Result<()> {
        if !flow.success {
            return Err(FlowError::InvalidFlow {
                flow_id: flow.flow_id.clone(),
                message: flow.error.clone(),
            });
        }
        let cancel = self.registry.register(&flow.flow_id)?;
        info!("flow_started");

        let result = self.run(flow, &cancel).await;
        self.registry.unregister(&flow.flow_id);

        match &result {
            Ok(()) => {}
            Err(FlowError::Cancelled(_)) => warn!("flow_cancelled"),
            Err(e) => error!(error = %e, "flow_failed"),
        }
        result
    }

    async fn run(
        &self,
        flow: &mut FlowModel,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<()> {
        let count = flow.main_func.statements.len();
        for idx in 0..count {
            if cancel.is_cancelled() {
                if let Some(stmt) = stmt_at(flow, &[idx]) {
                    stmt.status = StatementStatus::Cancelled;
                }
                let err = FlowError::Cancelled(flow.flow_id.clone());
                flow.error = err.to_string();
                self.observer.on_progress(flow);
                return Err(err);
            }

            if let Some(stmt) = stmt_at(flow, &[idx]) {
                begin(stmt);
            }
            let outcome = self.exec_statement(flow, vec![idx], cancel).await;
            if let Some(stmt) = stmt_at(flow, &[idx]) {
                finish(stmt, &outcome);
            }
            if let Err(e) = &outcome {
                flow.error = e.to_string();
            }
            self.observer.on_progress(flow);

            match outcome {
                Ok(Control::Next) | Ok(Control::NextFailedContinue) => {}
                Ok(Control::Halt) => {
                    info!("flow_returned_early");
                    self.observer.on_early_return(flow);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        info!("flow_completed");
        self.observer.on_complete(flow);
        Ok(())
    }
}

/* ===================== Statement bookkeeping ===================== */

/// Walk a statement path: first element indexes the main body, the rest
/// descend through `if` children.
pub(crate) fn stmt_at<'a>(flow: &'a mut FlowModel, path: &[usize]) -> Option<&'a mut Statement> {
    let (first, rest) = path.split_first()?;
    let mut stmt = flow.main_func.statements.get_mut(*first)?;
    for child_idx in rest {
        stmt = match &mut stmt.kind {
            StatementKind::If { children, .. } => children.get_mut(*child_idx)?,
            _ => return None,
        };
    }
    Some(stmt)
}

pub(crate) fn begin(stmt: &mut Statement) {
    stmt.status = StatementStatus::Running;
    stmt.started_at = Some(Utc::now());
}

pub(crate) fn finish(stmt: &mut Statement, outcome: &Result<Control>) {
    stmt.finished_at = Some(Utc::now());
    stmt.status = match outcome {
        Ok(Control::Next) | Ok(Control::Halt) => StatementStatus::Completed,
        Ok(Control::NextFailedContinue) => StatementStatus::FailedContinue,
        Err(FlowError::Cancelled(_)) => StatementStatus::Cancelled,
        Err(_) => StatementStatus::Failed,
    };
}
