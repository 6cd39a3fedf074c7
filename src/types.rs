use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/* ===================== Values ===================== */

/// Runtime value type
///
/// Closed union over everything the flow grammar can produce: literals from
/// the input map, handler outputs, and the error marker written into
/// `error`-typed returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Error value carrying a message
    Err(String),
}

impl Val {
    /// Check if value is nil (for `!= nil` conditions)
    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Null)
    }

    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::Str(s) => s == "true",
            Val::Err(_) => false,
        }
    }

    /// Display form used by `{{placeholder}}` substitution
    pub fn render(&self) -> String {
        match self {
            Val::Null => String::new(),
            Val::Bool(b) => b.to_string(),
            Val::Int(i) => i.to_string(),
            Val::Float(f) => f.to_string(),
            Val::Str(s) => s.clone(),
            Val::Err(msg) => msg.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "nil",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "string",
            Val::Err(_) => "error",
        }
    }

    /// Classify a source-text literal: quoted string, bool, int, float,
    /// nil, or bare text (kept as a string).
    pub fn from_literal(text: &str) -> Val {
        let text = text.trim();
        if text.is_empty() {
            return Val::Str(String::new());
        }
        if let Some(content) = strip_quotes(text) {
            return Val::Str(unescape(content));
        }
        match text {
            "nil" | "null" => return Val::Null,
            "true" => return Val::Bool(true),
            "false" => return Val::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Val::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Val::Float(f);
        }
        Val::Str(text.to_string())
    }
}

/// Return the content between matching quotes, or None if `text` is not a
/// quoted literal.
pub(crate) fn strip_quotes(text: &str) -> Option<&str> {
    if text.len() < 2 {
        return None;
    }
    let first = text.chars().next()?;
    if (first == '"' || first == '\'') && text.ends_with(first) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Process standard escape sequences in a quoted literal's content.
pub(crate) fn unescape(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(other) => result.push(other),
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/* ===================== Steps ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
}

/// A declared, reusable reference to an external function with a formal
/// input/output parameter contract. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub function: String,
    #[serde(default)]
    pub input_params: Vec<ParamInfo>,
    #[serde(default)]
    pub output_params: Vec<ParamInfo>,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Val>,
}

/* ===================== Statements ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Pending,
    Running,
    Completed,
    Failed,
    FailedContinue,
    Cancelled,
}

/// Per-call options parsed from a statement's trailing `{...}` metadata
/// block at construction time. Unknown keys are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub retry: u32,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub err_continue: Option<bool>,
    #[serde(rename = "async")]
    pub run_async: bool,
    pub priority: Option<String>,
    pub debug: bool,
    pub log_level: Option<String>,
    pub model: Option<String>,
}

impl ExecutionOptions {
    pub fn from_metadata(meta: &HashMap<String, Val>) -> Self {
        let mut opts = ExecutionOptions::default();
        if let Some(Val::Int(n)) = meta.get("retry") {
            opts.retry = (*n).max(0) as u32;
        }
        if let Some(Val::Int(ms)) = meta.get("timeout") {
            if *ms > 0 {
                opts.timeout_ms = Some(*ms as u64);
            }
        }
        if let Some(Val::Bool(b)) = meta.get("err_continue") {
            opts.err_continue = Some(*b);
        }
        if let Some(Val::Bool(b)) = meta.get("async") {
            opts.run_async = *b;
        }
        if let Some(Val::Str(s)) = meta.get("priority") {
            opts.priority = Some(s.clone());
        }
        if let Some(Val::Bool(b)) = meta.get("debug") {
            opts.debug = *b;
        }
        if let Some(Val::Str(s)) = meta.get("log_level") {
            opts.log_level = Some(s.clone());
        }
        if let Some(Val::Str(s)) = meta.get("model") {
            opts.model = Some(s.clone());
        }
        opts
    }
}

/// A call-site actual parameter. `is_input` marks a reference into the
/// flow's input map (`input["key"]`); `value` then holds the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub value: String,
    pub is_input: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatementKind {
    Call {
        function: String,
        args: Vec<Argument>,
        returns: Vec<String>,
        #[serde(default)]
        options: ExecutionOptions,
        #[serde(default)]
        desc: String,
    },
    If {
        condition: String,
        children: Vec<Statement>,
    },
    Var {
        content: String,
    },
    Return,
}

/// One executable unit inside the flow's main body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(flatten)]
    pub kind: StatementKind,
    pub line_number: usize,
    pub status: StatementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Statement {
    pub fn new(kind: StatementKind, line_number: usize) -> Self {
        Self {
            kind,
            line_number,
            status: StatementStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }
}

/* ===================== Variables ===================== */

/// One entry in the flow's flat variable table. `source` is the producing
/// step's name, `"assignment"`, or `"input"`; last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub value: Val,
    pub source: String,
    pub line_num: usize,
    pub is_input: bool,
}

/* ===================== Flow model ===================== */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainFunc {
    pub statements: Vec<Statement>,
}

/// The aggregate parse result and the flow's entire mutable execution
/// state. The executor mutates `variables` and statement statuses in place;
/// the progress-update observer sees the whole model after every statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowModel {
    pub flow_id: String,
    pub input_vars: HashMap<String, Val>,
    pub steps: Vec<StepDefinition>,
    pub main_func: MainFunc,
    pub variables: HashMap<String, VariableInfo>,
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

impl FlowModel {
    pub fn new(flow_id: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            input_vars: HashMap::new(),
            steps: Vec::new(),
            main_func: MainFunc::default(),
            variables: HashMap::new(),
            success: true,
            error: String::new(),
        }
    }

    pub fn find_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}
