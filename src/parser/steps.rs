//! Step declarations and the `input` literal map.
//!
//! Both live outside the `main` block. Declarations are `;`-terminated and
//! may span lines; anything that does not parse as a declaration is skipped.

use std::collections::HashMap;

use super::{
    find_matching_paren, find_unquoted, is_identifier, parse_metadata_block, split_top_level,
    strip_line_comment,
};
use crate::types::{ParamInfo, StepDefinition, Val};

/// Extract the `input = { key: value, ... }` literal map. Entries may be
/// separated by commas or newlines; the block may span lines.
pub(crate) fn parse_input_block(residual: &str) -> HashMap<String, Val> {
    let mut map = HashMap::new();
    let mut collecting = false;
    let mut depth = 0i32;
    let mut inner = String::new();

    for raw in residual.lines() {
        let (code, _) = strip_line_comment(raw);
        if !collecting {
            let t = code.trim_start();
            let Some(after) = t.strip_prefix("input") else {
                continue;
            };
            let after = after.trim_start();
            let Some(rest) = after.strip_prefix('=') else {
                continue;
            };
            let Some(pos) = rest.find('{') else {
                continue;
            };
            collecting = true;
            depth = 1;
            if scan_segment(&rest[pos + 1..], &mut depth, &mut inner) {
                break;
            }
            inner.push('\n');
        } else {
            if scan_segment(code, &mut depth, &mut inner) {
                break;
            }
            inner.push('\n');
        }
    }

    if !collecting {
        return map;
    }

    for line in inner.lines() {
        for entry in split_top_level(line, ',') {
            let Some(colon) = find_unquoted(&entry, ':') else {
                continue;
            };
            let key = entry[..colon].trim();
            let key = crate::types::strip_quotes(key).unwrap_or(key);
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), Val::from_literal(entry[colon + 1..].trim()));
        }
    }

    map
}

/// Append `segment` to `out` until the block's closing brace. Returns true
/// once the block is closed.
fn scan_segment(segment: &str, depth: &mut i32, out: &mut String) -> bool {
    let mut quote: Option<char> = None;
    let mut escape = false;
    for ch in segment.chars() {
        if let Some(q) = quote {
            out.push(ch);
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
                out.push(ch);
            }
            '{' => {
                *depth += 1;
                out.push(ch);
            }
            '}' => {
                *depth -= 1;
                if *depth == 0 {
                    return true;
                }
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    false
}

/// Collect every `;`-terminated step declaration from the residual text.
/// Malformed candidates are dropped without error.
pub(crate) fn parse_step_declarations(residual: &str) -> Vec<StepDefinition> {
    let mut steps = Vec::new();
    let mut pending: Option<String> = None;

    for raw in residual.lines() {
        let (code, _) = strip_line_comment(raw);
        let t = code.trim();
        if t.is_empty() {
            continue;
        }
        let mut buf = match pending.take() {
            Some(buf) => buf,
            None if looks_like_declaration_start(t) => String::new(),
            None => continue,
        };
        if !buf.is_empty() {
            buf.push(' ');
        }
        if let Some(pos) = find_unquoted(t, ';') {
            buf.push_str(&t[..pos]);
            if let Some(step) = parse_declaration(&buf) {
                steps.push(step);
            }
        } else {
            buf.push_str(t);
            pending = Some(buf);
        }
    }

    steps
}

fn looks_like_declaration_start(code: &str) -> bool {
    let Some(eq) = find_unquoted(code, '=') else {
        return false;
    };
    if eq > 0 && code[..eq].ends_with(':') {
        return false;
    }
    let alias = code[..eq].trim();
    alias != "input" && is_identifier(alias)
}

/// Parse one collapsed declaration:
/// `alias = fq.name(params) -> (outputs) {metadata}` or the static form
/// `alias = fq.name[caseID] -> (outputs)`.
fn parse_declaration(text: &str) -> Option<StepDefinition> {
    let eq = find_unquoted(text, '=')?;
    let alias = text[..eq].trim();
    if !is_identifier(alias) {
        return None;
    }
    let mut rest = text[eq + 1..].trim().to_string();

    // Trailing metadata block, if any, sits at bracket depth zero.
    let mut metadata = HashMap::new();
    if let Some(open) = find_brace_at_depth_zero(&rest) {
        if rest.ends_with('}') {
            metadata = parse_metadata_block(&rest[open + 1..rest.len() - 1]);
            rest.truncate(open);
        }
    }
    let rest = rest.trim();

    let (head, output_params) = match find_arrow(rest) {
        Some(arrow) => {
            let out_text = rest[arrow + 2..].trim();
            let inner = out_text.strip_prefix('(')?.strip_suffix(')')?;
            (rest[..arrow].trim(), parse_params(inner))
        }
        None => (rest, Vec::new()),
    };

    let bracket = head.find('[');
    let paren = head.find('(');
    match (bracket, paren) {
        (Some(b), p) if p.map(|p| b < p).unwrap_or(true) => {
            let function = head[..b].trim();
            let close = head.find(']')?;
            if close < b || !is_function_path(function) {
                return None;
            }
            let case = head[b + 1..close].trim();
            let case = crate::types::strip_quotes(case).unwrap_or(case);
            Some(StepDefinition {
                name: alias.to_string(),
                function: function.to_string(),
                input_params: Vec::new(),
                output_params,
                is_static: true,
                case_id: Some(case.to_string()),
                metadata,
            })
        }
        (_, Some(p)) => {
            let function = head[..p].trim();
            if !is_function_path(function) {
                return None;
            }
            let close = find_matching_paren(head, p)?;
            let input_params = parse_params(&head[p + 1..close]);
            Some(StepDefinition {
                name: alias.to_string(),
                function: function.to_string(),
                input_params,
                output_params,
                is_static: false,
                case_id: None,
                metadata,
            })
        }
        _ => None,
    }
}

/// First `{` at bracket depth zero, outside quotes.
fn find_brace_at_depth_zero(text: &str) -> Option<usize> {
    let mut depth = 0i32;
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
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '{' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Byte index of `->` outside quotes and parens.
fn find_arrow(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut prev_dash: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == q {
                quote = None;
            }
            prev_dash = None;
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                prev_dash = None;
            }
            '(' | '[' => {
                depth += 1;
                prev_dash = None;
            }
            ')' | ']' => {
                depth -= 1;
                prev_dash = None;
            }
            '-' if depth == 0 => prev_dash = Some(i),
            '>' if depth == 0 => {
                if let Some(start) = prev_dash {
                    if start + 1 == i {
                        return Some(start);
                    }
                }
                prev_dash = None;
            }
            _ => prev_dash = None,
        }
    }
    None
}

/// Parse a comma-separated parameter list. Entries accept both the
/// `name: type "description"` form and the legacy `type name` ordering;
/// the two may be mixed within one list.
fn parse_params(text: &str) -> Vec<ParamInfo> {
    split_top_level(text, ',')
        .iter()
        .filter_map(|entry| parse_param(entry))
        .collect()
}

fn parse_param(entry: &str) -> Option<ParamInfo> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let (head, description) = match entry.find(|c| c == '"' || c == '\'') {
        Some(q) => {
            let quote = entry[q..].chars().next()?;
            let end = entry[q + 1..].find(quote).map(|e| e + q + 1)?;
            (entry[..q].trim(), entry[q + 1..end].to_string())
        }
        None => (entry, String::new()),
    };

    if let Some(colon) = head.find(':') {
        let name = head[..colon].trim();
        if !is_identifier(name) {
            return None;
        }
        Some(ParamInfo {
            name: name.to_string(),
            param_type: head[colon + 1..].trim().to_string(),
            description,
        })
    } else {
        let mut tokens = head.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(ptype), Some(name)) if is_identifier(name) => Some(ParamInfo {
                name: name.to_string(),
                param_type: ptype.to_string(),
                description,
            }),
            (Some(name), None) if is_identifier(name) => Some(ParamInfo {
                name: name.to_string(),
                param_type: String::new(),
                description,
            }),
            _ => None,
        }
    }
}

fn is_function_path(text: &str) -> bool {
    !text.is_empty() && text.split('.').all(is_identifier)
}
