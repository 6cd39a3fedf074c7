//! Per-kind statement dispatch: function calls with retry and output
//! remapping, conditionals, assignments, and `return`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::expressions;
use super::{begin, finish, stmt_at, Control, Executor};
use crate::error::{FlowError, Result};
use crate::types::{
    strip_quotes, unescape, Argument, ExecutionOptions, FlowModel, StatementKind, StatementStatus,
    StepDefinition, Val, VariableInfo,
};

impl Executor {
    /// Execute the statement at `path`. Recursion handles `if` children;
    /// the future is boxed because the call graph is self-referential.
    pub(crate) fn exec_statement<'a>(
        &'a self,
        flow: &'a mut FlowModel,
        path: Vec<usize>,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Control>> + Send + 'a>> {
        Box::pin(async move {
            let Some(stmt) = stmt_at(flow, &path) else {
                return Ok(Control::Next);
            };
            let line = stmt.line_number;
            let kind = stmt.kind.clone();

            match kind {
                StatementKind::Call {
                    function,
                    args,
                    returns,
                    options,
                    ..
                } => {
                    self.exec_call(flow, cancel, &function, &args, &returns, &options, line)
                        .await
                }
                StatementKind::If {
                    condition,
                    children,
                } => {
                    if !expressions::evaluate_condition(&condition, &flow.variables) {
                        debug!(line, condition = %condition, "condition_false");
                        return Ok(Control::Next);
                    }
                    for child_idx in 0..children.len() {
                        let mut child_path = path.clone();
                        child_path.push(child_idx);
                        if cancel.is_cancelled() {
                            if let Some(child) = stmt_at(flow, &child_path) {
                                child.status = StatementStatus::Cancelled;
                            }
                            return Err(FlowError::Cancelled(flow.flow_id.clone()));
                        }
                        if let Some(child) = stmt_at(flow, &child_path) {
                            begin(child);
                        }
                        let outcome = self.exec_statement(flow, child_path.clone(), cancel).await;
                        if let Some(child) = stmt_at(flow, &child_path) {
                            finish(child, &outcome);
                        }
                        match outcome {
                            Ok(Control::Next) | Ok(Control::NextFailedContinue) => {}
                            other => return other,
                        }
                    }
                    Ok(Control::Next)
                }
                StatementKind::Var { content } => {
                    exec_var(flow, &content, line);
                    Ok(Control::Next)
                }
                StatementKind::Return => Ok(Control::Halt),
            }
        })
    }

    /// Function-call dispatch: resolve the step, remap arguments to formal
    /// input names, invoke the handler under the retry/continuation policy,
    /// then remap outputs into the variable table.
    #[allow(clippy::too_many_arguments)]
    async fn exec_call(
        &self,
        flow: &mut FlowModel,
        cancel: &CancellationToken,
        function: &str,
        args: &[Argument],
        returns: &[String],
        options: &ExecutionOptions,
        line: usize,
    ) -> Result<Control> {
        let Some(step) = flow.find_step(function).cloned() else {
            return Err(FlowError::StepNotFound {
                function: function.to_string(),
                line,
            });
        };

        let err_continue = options
            .err_continue
            .or_else(|| match step.metadata.get("err_continue") {
                Some(Val::Bool(b)) => Some(*b),
                _ => None,
            })
            .unwrap_or(false);

        // Static steps run against their recorded case, never call-site
        // arguments.
        let real_input: HashMap<String, Val> = if step.is_static {
            HashMap::new()
        } else {
            let mut map = HashMap::new();
            for (i, arg) in args.iter().enumerate() {
                let Some(param) = step.input_params.get(i) else {
                    break;
                };
                map.insert(param.name.clone(), expressions::resolve_argument(arg, flow));
            }
            map
        };

        let timeout_ms = options.timeout_ms.or(self.default_timeout_ms);
        let mut last_error = String::new();

        for attempt in 0..=options.retry {
            if attempt > 0 {
                warn!(step = %step.name, attempt, "step_retrying");
                let backoff = self.retry_backoff * attempt;
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => {
                        return Err(FlowError::Cancelled(flow.flow_id.clone()));
                    }
                }
            }

            let call = self
                .handler
                .execute_step(cancel, &step, &real_input, &step.output_params);
            let result = match timeout_ms {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), call).await {
                    Ok(r) => r,
                    Err(_) => Err(anyhow::anyhow!(
                        "step '{}' timed out after {}ms",
                        step.name,
                        ms
                    )),
                },
                None => call.await,
            };

            // Re-checked even on success, before outputs are bound.
            if cancel.is_cancelled() {
                return Err(FlowError::Cancelled(flow.flow_id.clone()));
            }

            match result {
                Ok(outcome) => {
                    for log in &outcome.logs {
                        debug!(step = %step.name, "{}", log);
                    }
                    if outcome.success {
                        bind_outputs(flow, &step, returns, outcome.outputs, line);
                        return Ok(Control::Next);
                    }
                    last_error = outcome
                        .error
                        .unwrap_or_else(|| "step reported failure".to_string());
                }
                Err(e) => last_error = e.to_string(),
            }

            if err_continue {
                warn!(step = %step.name, error = %last_error, "step_failed_continuing");
                return Ok(Control::NextFailedContinue);
            }
        }

        Err(FlowError::RetriesExhausted {
            step: step.name.clone(),
            attempts: options.retry + 1,
            message: last_error,
        })
    }
}

/// Bind each declared instance name to the handler output of the formal
/// parameter at the same position. A missing output key binds null.
fn bind_outputs(
    flow: &mut FlowModel,
    step: &StepDefinition,
    returns: &[String],
    mut outputs: HashMap<String, Val>,
    line: usize,
) {
    for (i, instance) in returns.iter().enumerate() {
        let Some(param) = step.output_params.get(i) else {
            break;
        };
        let value = outputs.remove(&param.name).unwrap_or(Val::Null);
        flow.variables.insert(
            instance.clone(),
            VariableInfo {
                name: instance.clone(),
                var_type: param.param_type.clone(),
                value,
                source: step.name.clone(),
                line_num: line,
                is_input: false,
            },
        );
    }
}

/// `name := value`: strip quotes, substitute placeholders once, store as a
/// string-typed assignment.
fn exec_var(flow: &mut FlowModel, content: &str, line: usize) {
    let Some(pos) = content.find(":=") else {
        return;
    };
    let name = content[..pos].trim();
    let raw = content[pos + 2..].trim();
    let literal = match strip_quotes(raw) {
        Some(inner) => unescape(inner),
        None => raw.to_string(),
    };
    let value = expressions::substitute_placeholders(&literal, &flow.variables);
    flow.variables.insert(
        name.to_string(),
        VariableInfo {
            name: name.to_string(),
            var_type: "string".to_string(),
            value: Val::Str(value),
            source: "assignment".to_string(),
            line_num: line,
            is_input: false,
        },
    );
}
