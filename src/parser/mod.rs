//! Flow source parser.
//!
//! Turns flow source text into a [`FlowModel`]: step declarations and the
//! `input` literal map come from the text outside the `main` block
//! ([`steps`]), the ordered statement list comes from the `main` body
//! ([`statements`]). Parsing is deliberately forgiving: malformed fragments
//! are skipped, and only a missing or unterminated `main` block marks the
//! model as failed (`success = false`).

pub mod statements;
pub mod steps;
pub mod validate;

pub use validate::{has_errors, validate, Severity, ValidationIssue};

use std::collections::HashMap;

use crate::types::{FlowModel, Val, VariableInfo};

/// Parse flow source text into a model ready for execution.
///
/// Never returns an error: structural failures are recorded on the model
/// (`success = false` plus a message) so callers can persist the failed
/// parse the same way they persist execution state.
pub fn parse_flow(flow_id: &str, source: &str) -> FlowModel {
    let mut flow = FlowModel::new(flow_id);

    let (body, body_start_line, residual) = match extract_main_block(source) {
        Ok(parts) => parts,
        Err(message) => {
            flow.success = false;
            flow.error = message;
            return flow;
        }
    };

    flow.input_vars = steps::parse_input_block(&residual);
    flow.steps = steps::parse_step_declarations(&residual);
    flow.main_func.statements = statements::parse_statements(&body, body_start_line);

    for (name, value) in &flow.input_vars {
        flow.variables.insert(
            name.clone(),
            VariableInfo {
                name: name.clone(),
                var_type: value.type_name().to_string(),
                value: value.clone(),
                source: "input".to_string(),
                line_num: 0,
                is_input: true,
            },
        );
    }

    flow
}

/// Locate the `main` block. Returns the body lines, the 1-based source line
/// of the first body line, and the residual text outside the block.
fn extract_main_block(source: &str) -> Result<(Vec<String>, usize, String), String> {
    let lines: Vec<&str> = source.lines().collect();

    let mut open_idx = None;
    for (i, raw) in lines.iter().enumerate() {
        let (code, _) = strip_line_comment(raw);
        if is_main_opener(code.trim()) {
            open_idx = Some(i);
            break;
        }
    }
    let open_idx = open_idx.ok_or_else(|| "missing main block".to_string())?;

    let mut depth = brace_delta(strip_line_comment(lines[open_idx]).0);
    let mut close_idx = None;
    for (j, raw) in lines.iter().enumerate().skip(open_idx + 1) {
        depth += brace_delta(strip_line_comment(raw).0);
        if depth <= 0 {
            close_idx = Some(j);
            break;
        }
    }
    let close_idx = close_idx.ok_or_else(|| "unterminated main block".to_string())?;

    let body: Vec<String> = lines[open_idx + 1..close_idx]
        .iter()
        .map(|l| l.to_string())
        .collect();

    let mut residual = String::new();
    for (i, raw) in lines.iter().enumerate() {
        if i < open_idx || i > close_idx {
            residual.push_str(raw);
            residual.push('\n');
        }
    }

    Ok((body, open_idx + 2, residual))
}

/// Accepts `main {`, `main() {`, and `func main... {` openers.
fn is_main_opener(code: &str) -> bool {
    let code = code.strip_prefix("func ").unwrap_or(code).trim_start();
    let Some(rest) = code.strip_prefix("main") else {
        return false;
    };
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("()").unwrap_or(rest).trim_start();
    rest == "{"
}

/* ===================== Shared scanning helpers ===================== */

/// Split `line` at the first `//` outside quotes. Returns the code part and
/// the comment text (without the slashes), if any.
pub(crate) fn strip_line_comment(line: &str) -> (&str, Option<&str>) {
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut prev_slash: Option<usize> = None;
    for (i, ch) in line.char_indices() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == q {
                quote = None;
            }
            prev_slash = None;
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                prev_slash = None;
            }
            '/' => {
                if let Some(start) = prev_slash {
                    return (&line[..start], Some(&line[i + 1..]));
                }
                prev_slash = Some(i);
            }
            _ => prev_slash = None,
        }
    }
    (line, None)
}

/// Net brace depth change of a code line, ignoring braces inside quotes.
pub(crate) fn brace_delta(code: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escape = false;
    for ch in code.chars() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Split on `sep` at bracket depth zero, respecting quotes. Empty parts are
/// dropped.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escape = false;
    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            c if c == sep && depth == 0 => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Byte index of the first `target` outside quotes, if any.
pub(crate) fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escape = false;
    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            c if c == target => return Some(i),
            _ => {}
        }
    }
    None
}

/// Byte index of the `)` matching the `(` at `open_idx`, quote-aware.
pub(crate) fn find_matching_paren(text: &str, open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escape = false;
    for (i, ch) in text[open_idx..].char_indices() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open_idx + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the inside of a `{key: value, ...}` metadata block into typed
/// values. Quoted values become strings, `true`/`false` booleans, digit
/// runs integers; anything else is kept as bare text.
pub(crate) fn parse_metadata_block(inner: &str) -> HashMap<String, Val> {
    let mut map = HashMap::new();
    for entry in split_top_level(inner, ',') {
        let Some(colon) = find_unquoted(&entry, ':') else {
            continue;
        };
        let key = entry[..colon].trim();
        let key = crate::types::strip_quotes(key).unwrap_or(key);
        if key.is_empty() {
            continue;
        }
        let value = Val::from_literal(entry[colon + 1..].trim());
        map.insert(key.to_string(), value);
    }
    map
}

/// Identifiers start with a letter or underscore; letters may be non-ASCII.
pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StatementKind, Val};

    const FULL_SOURCE: &str = r#"
// customer onboarding flow
input = {
    name: "Ann",
    age: 32,
    notify: true
}

create = crm.accounts.create(name: string "customer name") -> (id: string "account id", err: error "failure");
record = audit.recorded[case-7] -> (entry: string "audit entry");

main {
    id, e := create(input["name"]){retry:1}
    if e != nil {
        return
    }
    greeting := "Welcome {{name}}"
    entry := record()
}
"#;

    #[test]
    fn test_parse_full_source() {
        let flow = parse_flow("onboard-1", FULL_SOURCE);
        assert!(flow.success, "{}", flow.error);
        assert_eq!(flow.flow_id, "onboard-1");
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.input_vars.len(), 3);
        assert_eq!(flow.input_vars["name"], Val::Str("Ann".into()));
        assert_eq!(flow.input_vars["age"], Val::Int(32));
        assert_eq!(flow.input_vars["notify"], Val::Bool(true));
        assert_eq!(flow.main_func.statements.len(), 4);
    }

    #[test]
    fn test_input_vars_seed_variables_table() {
        let flow = parse_flow("f", FULL_SOURCE);
        let var = &flow.variables["name"];
        assert_eq!(var.value, Val::Str("Ann".into()));
        assert_eq!(var.source, "input");
        assert!(var.is_input);
        assert_eq!(var.var_type, "string");
    }

    #[test]
    fn test_missing_main_is_structural_failure() {
        let flow = parse_flow("f", "create = a.b.c() -> ();");
        assert!(!flow.success);
        assert_eq!(flow.error, "missing main block");
    }

    #[test]
    fn test_unterminated_main_is_structural_failure() {
        let flow = parse_flow("f", "main {\n    x := \"y\"\n");
        assert!(!flow.success);
        assert_eq!(flow.error, "unterminated main block");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse_flow("same", FULL_SOURCE);
        let second = parse_flow("same", FULL_SOURCE);
        assert_eq!(first, second);
    }

    #[test]
    fn test_main_opener_variants() {
        for source in ["main {\n}", "main() {\n}", "func main() {\n}", "func main {\n}"] {
            let flow = parse_flow("f", source);
            assert!(flow.success, "opener rejected: {:?}", source);
        }
        assert!(!parse_flow("f", "mainframe {\n}").success);
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let source = r#"
??? not a declaration ???
main {
    @@@
    x := "ok"
    12345
}
"#;
        let flow = parse_flow("f", source);
        assert!(flow.success);
        assert_eq!(flow.main_func.statements.len(), 1);
        assert!(matches!(
            flow.main_func.statements[0].kind,
            StatementKind::Var { .. }
        ));
    }

    #[test]
    fn test_strip_line_comment() {
        assert_eq!(strip_line_comment("x := 1 // note"), ("x := 1 ", Some(" note")));
        assert_eq!(strip_line_comment(r#"x := "a//b""#), (r#"x := "a//b""#, None));
        assert_eq!(strip_line_comment("plain"), ("plain", None));
    }

    #[test]
    fn test_split_top_level_respects_nesting() {
        let parts = split_top_level(r#"a, f(b, c), "d,e""#, ',');
        assert_eq!(parts, vec!["a", "f(b, c)", r#""d,e""#]);
    }

    #[test]
    fn test_parse_metadata_block_types() {
        let meta = parse_metadata_block(r#"retry:3, priority:"high", debug:true"#);
        assert_eq!(meta["retry"], Val::Int(3));
        assert_eq!(meta["priority"], Val::Str("high".into()));
        assert_eq!(meta["debug"], Val::Bool(true));
    }
}
