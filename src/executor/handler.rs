//! The effect boundary.
//!
//! All real work happens behind [`StepHandler`]; the engine itself performs
//! no I/O. A handler failure is either an `Err` on the channel or a
//! returned outcome with `success = false` — the retry policy treats both
//! identically.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::types::{ParamInfo, StepDefinition, Val};

/// What a handler reports back for one step invocation. Output keys must
/// match the step's formal output parameter names.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub success: bool,
    pub outputs: HashMap<String, Val>,
    pub error: Option<String>,
    pub logs: Vec<String>,
}

impl StepOutcome {
    pub fn ok(outputs: HashMap<String, Val>) -> Self {
        Self {
            success: true,
            outputs,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A handler may be slow or blocking; the engine will not interrupt it.
/// The token is passed so a cooperative handler can cut its own work short.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute_step(
        &self,
        cancel: &CancellationToken,
        step: &StepDefinition,
        real_input: &HashMap<String, Val>,
        expected_outputs: &[ParamInfo],
    ) -> anyhow::Result<StepOutcome>;
}

/// Handler that succeeds every step, echoing inputs back into same-named
/// outputs. Used by `cascade run` for dry-running a flow without wiring up
/// real effects.
pub struct EchoHandler;

#[async_trait]
impl StepHandler for EchoHandler {
    async fn execute_step(
        &self,
        _cancel: &CancellationToken,
        step: &StepDefinition,
        real_input: &HashMap<String, Val>,
        expected_outputs: &[ParamInfo],
    ) -> anyhow::Result<StepOutcome> {
        let mut outputs = HashMap::new();
        for param in expected_outputs {
            let value = real_input.get(&param.name).cloned().unwrap_or(Val::Null);
            outputs.insert(param.name.clone(), value);
        }
        let mut outcome = StepOutcome::ok(outputs);
        outcome.logs.push(format!(
            "echo {} ({} input(s))",
            step.function,
            real_input.len()
        ));
        Ok(outcome)
    }
}
