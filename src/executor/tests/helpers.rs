//! Shared fixtures for executor tests: scripted handlers with invocation
//! counters and a recording observer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::executor::{FlowObserver, StepHandler, StepOutcome};
use crate::parser::parse_flow;
use crate::types::{FlowModel, ParamInfo, StepDefinition, Val};

/// Parse a flow source and assert it parsed cleanly.
pub fn parse_ok(flow_id: &str, source: &str) -> FlowModel {
    let flow = parse_flow(flow_id, source);
    assert!(flow.success, "parse failed: {}", flow.error);
    flow
}

/// Handler that fails the first `fail_first` invocations, then succeeds
/// with the scripted outputs. Records every real-input map it sees.
pub struct ScriptedHandler {
    calls: AtomicUsize,
    fail_first: usize,
    outputs: HashMap<String, Val>,
    pub inputs_seen: Mutex<Vec<HashMap<String, Val>>>,
}

impl ScriptedHandler {
    pub fn succeeding(outputs: HashMap<String, Val>) -> Self {
        Self::failing_then(0, outputs)
    }

    pub fn failing_then(fail_first: usize, outputs: HashMap<String, Val>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
            outputs,
            inputs_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_then(usize::MAX, HashMap::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for ScriptedHandler {
    async fn execute_step(
        &self,
        _cancel: &CancellationToken,
        _step: &StepDefinition,
        real_input: &HashMap<String, Val>,
        _expected_outputs: &[ParamInfo],
    ) -> anyhow::Result<StepOutcome> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs_seen
            .lock()
            .unwrap()
            .push(real_input.clone());
        if n < self.fail_first {
            return Ok(StepOutcome::failed("scripted failure"));
        }
        Ok(StepOutcome::ok(self.outputs.clone()))
    }
}

/// Handler that records step names in call order and fails the listed
/// steps, succeeding (with empty outputs) everywhere else.
pub struct PerStepHandler {
    pub calls: Mutex<Vec<String>>,
    fail_steps: Vec<String>,
}

impl PerStepHandler {
    pub fn failing_steps(fail_steps: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_steps: fail_steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepHandler for PerStepHandler {
    async fn execute_step(
        &self,
        _cancel: &CancellationToken,
        step: &StepDefinition,
        _real_input: &HashMap<String, Val>,
        _expected_outputs: &[ParamInfo],
    ) -> anyhow::Result<StepOutcome> {
        self.calls.lock().unwrap().push(step.name.clone());
        if self.fail_steps.contains(&step.name) {
            return Ok(StepOutcome::failed(format!("{} failed", step.name)));
        }
        Ok(StepOutcome::ok(HashMap::new()))
    }
}

/// Observer that counts every notification kind and keeps the most recent
/// model snapshot.
#[derive(Default)]
pub struct RecordingObserver {
    pub progress: AtomicUsize,
    pub completes: AtomicUsize,
    pub early_returns: AtomicUsize,
    pub last: Mutex<Option<FlowModel>>,
}

impl RecordingObserver {
    pub fn progress_count(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn complete_count(&self) -> usize {
        self.completes.load(Ordering::SeqCst)
    }

    pub fn early_return_count(&self) -> usize {
        self.early_returns.load(Ordering::SeqCst)
    }

    pub fn last_snapshot(&self) -> Option<FlowModel> {
        self.last.lock().unwrap().clone()
    }
}

impl FlowObserver for RecordingObserver {
    fn on_progress(&self, flow: &FlowModel) {
        self.progress.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(flow.clone());
    }

    fn on_complete(&self, flow: &FlowModel) {
        self.completes.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(flow.clone());
    }

    fn on_early_return(&self, flow: &FlowModel) {
        self.early_returns.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(flow.clone());
    }
}
