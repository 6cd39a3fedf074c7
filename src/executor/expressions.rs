//! Runtime value resolution: call arguments, conditions, and placeholder
//! substitution.

use std::collections::HashMap;

use crate::types::{strip_quotes, unescape, Argument, FlowModel, Val, VariableInfo};

/// Resolve one call-site argument to a runtime value.
///
/// Input references look up the flow's input map by key, falling back to
/// the key text as a literal. Other arguments are quoted literals, known
/// variables, or bare literals, in that order.
pub(crate) fn resolve_argument(arg: &Argument, flow: &FlowModel) -> Val {
    if arg.is_input {
        return flow
            .input_vars
            .get(&arg.value)
            .cloned()
            .unwrap_or_else(|| Val::from_literal(&arg.value));
    }
    if let Some(content) = strip_quotes(&arg.value) {
        return Val::Str(unescape(content));
    }
    if let Some(var) = flow.variables.get(&arg.value) {
        return var.value.clone();
    }
    Val::from_literal(&arg.value)
}

/// Evaluate a condition against the minimal grammar: `<var> != nil`,
/// `<var> == true`, `<var> == false`, `<var> != true`. Any other form, and
/// any reference to an unset variable, evaluates to false.
pub(crate) fn evaluate_condition(condition: &str, vars: &HashMap<String, VariableInfo>) -> bool {
    let parts: Vec<&str> = condition.split_whitespace().collect();
    if parts.len() != 3 {
        return false;
    }
    let Some(var) = vars.get(parts[0]) else {
        return false;
    };
    match (parts[1], parts[2]) {
        ("!=", "nil") => !var.value.is_nil(),
        ("==", "true") => var.value.is_truthy(),
        ("==", "false") => !var.value.is_truthy(),
        ("!=", "true") => !var.value.is_truthy(),
        _ => false,
    }
}

/// Replace every `{{name}}` with the variable's rendered value, in a single
/// left-to-right pass. Unresolved placeholders pass through unchanged;
/// substituted text is never rescanned.
pub(crate) fn substitute_placeholders(text: &str, vars: &HashMap<String, VariableInfo>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start + 2..].find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = rest[start + 2..start + 2 + end].trim();
        match vars.get(name) {
            Some(var) => out.push_str(&var.value.render()),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    out
}
