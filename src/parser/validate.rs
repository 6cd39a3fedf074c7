//! Pre-flight semantic validation of a parsed flow.
//!
//! The executor tolerates everything reported here (undeclared steps fail
//! at dispatch, bad conditions evaluate false), so these checks exist to
//! surface author mistakes before a flow ever runs.

use serde::Serialize;
use std::collections::HashSet;

use crate::types::{FlowModel, Statement, StatementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Walk the statement tree in execution order and report issues.
pub fn validate(flow: &FlowModel) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut defined: HashSet<String> = flow.input_vars.keys().cloned().collect();
    let mut called: HashSet<String> = HashSet::new();

    check_statements(
        flow,
        &flow.main_func.statements,
        &mut defined,
        &mut called,
        &mut issues,
    );

    for step in &flow.steps {
        if !called.contains(&step.name) {
            issues.push(ValidationIssue {
                severity: Severity::Warning,
                line: 0,
                message: format!("step '{}' is declared but never called", step.name),
            });
        }
    }

    issues
}

fn check_statements(
    flow: &FlowModel,
    stmts: &[Statement],
    defined: &mut HashSet<String>,
    called: &mut HashSet<String>,
    issues: &mut Vec<ValidationIssue>,
) {
    for stmt in stmts {
        let line = stmt.line_number;
        match &stmt.kind {
            StatementKind::Call {
                function,
                args,
                returns,
                ..
            } => {
                called.insert(function.clone());
                match flow.find_step(function) {
                    None => issues.push(ValidationIssue {
                        severity: Severity::Error,
                        line,
                        message: format!("call references undeclared step '{}'", function),
                    }),
                    Some(step) => {
                        if step.is_static && !args.is_empty() {
                            issues.push(ValidationIssue {
                                severity: Severity::Warning,
                                line,
                                message: format!(
                                    "static step '{}' ignores its {} argument(s)",
                                    function,
                                    args.len()
                                ),
                            });
                        }
                        if !step.is_static && args.len() > step.input_params.len() {
                            issues.push(ValidationIssue {
                                severity: Severity::Error,
                                line,
                                message: format!(
                                    "step '{}' takes {} input(s), {} supplied",
                                    function,
                                    step.input_params.len(),
                                    args.len()
                                ),
                            });
                        }
                        if returns.len() > step.output_params.len() {
                            issues.push(ValidationIssue {
                                severity: Severity::Error,
                                line,
                                message: format!(
                                    "step '{}' produces {} output(s), {} bound",
                                    function,
                                    step.output_params.len(),
                                    returns.len()
                                ),
                            });
                        }
                    }
                }
                for name in returns {
                    defined.insert(name.clone());
                }
            }
            StatementKind::If {
                condition,
                children,
            } => {
                if !condition_is_recognized(condition) {
                    issues.push(ValidationIssue {
                        severity: Severity::Warning,
                        line,
                        message: format!(
                            "condition '{}' is not a recognized comparison and always evaluates false",
                            condition
                        ),
                    });
                }
                check_statements(flow, children, defined, called, issues);
            }
            StatementKind::Var { content } => {
                if let Some(pos) = content.find(":=") {
                    let name = content[..pos].trim();
                    for placeholder in placeholders(&content[pos + 2..]) {
                        if !defined.contains(&placeholder) {
                            issues.push(ValidationIssue {
                                severity: Severity::Warning,
                                line,
                                message: format!(
                                    "placeholder '{}' references a variable never defined before this point",
                                    placeholder
                                ),
                            });
                        }
                    }
                    defined.insert(name.to_string());
                }
            }
            StatementKind::Return => {}
        }
    }
}

/// The executor's condition grammar: `<var> != nil`, `<var> == true`,
/// `<var> == false`, `<var> != true`.
fn condition_is_recognized(condition: &str) -> bool {
    let parts: Vec<&str> = condition.split_whitespace().collect();
    if parts.len() != 3 {
        return false;
    }
    matches!(
        (parts[1], parts[2]),
        ("!=", "nil") | ("==", "true") | ("==", "false") | ("!=", "true")
    )
}

fn placeholders(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        names.push(rest[start + 2..start + 2 + end].trim().to_string());
        rest = &rest[start + 2 + end + 2..];
    }
    names
}
