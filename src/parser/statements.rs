//! Statement parsing for the `main` body.
//!
//! One statement per line, except `if` blocks which span until their
//! closing brace. Lines that match no statement form are noise and are
//! dropped.

use super::{
    brace_delta, find_matching_paren, is_identifier, parse_metadata_block, split_top_level,
    strip_line_comment,
};
use crate::types::{Argument, ExecutionOptions, Statement, StatementKind};

/// Parse the main-body lines into an ordered statement list. `start_line`
/// is the 1-based source line of the first body line.
pub(crate) fn parse_statements(lines: &[String], start_line: usize) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line_no = start_line + i;
        let (code, comment) = strip_line_comment(&lines[i]);
        let code = code.trim();
        if code.is_empty() {
            i += 1;
            continue;
        }
        if let Some(condition) = parse_if_opener(code) {
            let Some(end) = find_block_end(lines, i) else {
                // Unterminated block inside an otherwise well-formed main;
                // nothing after it can be attributed reliably.
                break;
            };
            let children = parse_children(&lines[i + 1..end], start_line + i + 1);
            out.push(Statement::new(StatementKind::If { condition, children }, line_no));
            i = end + 1;
            continue;
        }
        if let Some(stmt) = parse_line_statement(code, comment, line_no) {
            out.push(stmt);
        }
        i += 1;
    }
    out
}

/// Parse the body of an `if` block. Only single-level nesting is supported:
/// a nested `if` is skipped together with its block.
fn parse_children(lines: &[String], start_line: usize) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let (code, comment) = strip_line_comment(&lines[i]);
        let code = code.trim();
        if code.is_empty() {
            i += 1;
            continue;
        }
        if parse_if_opener(code).is_some() {
            i = find_block_end(lines, i).map(|e| e + 1).unwrap_or(lines.len());
            continue;
        }
        if let Some(stmt) = parse_line_statement(code, comment, start_line + i) {
            out.push(stmt);
        }
        i += 1;
    }
    out
}

/// Line index of the `}` closing the block opened at `open_idx`.
fn find_block_end(lines: &[String], open_idx: usize) -> Option<usize> {
    let mut depth = brace_delta(strip_line_comment(&lines[open_idx]).0);
    for (j, raw) in lines.iter().enumerate().skip(open_idx + 1) {
        depth += brace_delta(strip_line_comment(raw).0);
        if depth <= 0 {
            return Some(j);
        }
    }
    None
}

fn parse_if_opener(code: &str) -> Option<String> {
    let rest = code.strip_prefix("if")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let condition = rest.trim().strip_suffix('{')?;
    Some(condition.trim().to_string())
}

/// Parse one single-line statement: `return`, a binding or bare function
/// call, or a variable assignment.
fn parse_line_statement(code: &str, comment: Option<&str>, line: usize) -> Option<Statement> {
    if code == "return" {
        return Some(Statement::new(StatementKind::Return, line));
    }

    if let Some(pos) = code.find(":=") {
        let lhs = code[..pos].trim();
        let rhs = code[pos + 2..].trim();
        if let Some((function, args, options)) = parse_call_expr(rhs) {
            let returns: Vec<String> = lhs
                .split(',')
                .map(str::trim)
                .filter(|t| is_identifier(t))
                .map(str::to_string)
                .collect();
            return Some(Statement::new(
                StatementKind::Call {
                    function,
                    args,
                    returns,
                    options,
                    desc: comment.map(|c| c.trim().to_string()).unwrap_or_default(),
                },
                line,
            ));
        }
        if is_identifier(lhs) {
            return Some(Statement::new(
                StatementKind::Var {
                    content: code.to_string(),
                },
                line,
            ));
        }
        return None;
    }

    if let Some((function, args, options)) = parse_call_expr(code) {
        return Some(Statement::new(
            StatementKind::Call {
                function,
                args,
                returns: Vec::new(),
                options,
                desc: comment.map(|c| c.trim().to_string()).unwrap_or_default(),
            },
            line,
        ));
    }

    None
}

/// Parse `alias(arg1, arg2){key:val}` into its parts.
fn parse_call_expr(text: &str) -> Option<(String, Vec<Argument>, ExecutionOptions)> {
    let text = text.trim();
    let paren = text.find('(')?;
    let name = text[..paren].trim();
    if !is_identifier(name) {
        return None;
    }
    let close = find_matching_paren(text, paren)?;

    let args = split_top_level(&text[paren + 1..close], ',')
        .into_iter()
        .map(|a| classify_argument(&a))
        .collect();

    let trailer = text[close + 1..].trim();
    let options = match trailer.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        Some(inner) => ExecutionOptions::from_metadata(&parse_metadata_block(inner)),
        None => ExecutionOptions::default(),
    };

    Some((name.to_string(), args, options))
}

/// `input["key"]` references the flow's input map; everything else stays
/// raw text, classified at resolution time.
fn classify_argument(text: &str) -> Argument {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("input") {
        let rest = rest.trim_start();
        if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let key = inner.trim();
            let key = crate::types::strip_quotes(key).unwrap_or(key);
            return Argument {
                value: key.to_string(),
                is_input: true,
            };
        }
    }
    Argument {
        value: text.to_string(),
        is_input: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatementStatus;

    fn parse(source: &str) -> Vec<Statement> {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        parse_statements(&lines, 1)
    }

    #[test]
    fn test_parse_call_with_returns_args_and_metadata() {
        let stmts = parse(r#"id, e := create(input["name"], "literal", other){retry:2, timeout:5000} // make account"#);
        assert_eq!(stmts.len(), 1);
        let StatementKind::Call {
            function,
            args,
            returns,
            options,
            desc,
        } = &stmts[0].kind
        else {
            panic!("expected call");
        };
        assert_eq!(function, "create");
        assert_eq!(returns, &vec!["id".to_string(), "e".to_string()]);
        assert_eq!(args.len(), 3);
        assert!(args[0].is_input);
        assert_eq!(args[0].value, "name");
        assert!(!args[1].is_input);
        assert_eq!(args[1].value, r#""literal""#);
        assert_eq!(args[2].value, "other");
        assert_eq!(options.retry, 2);
        assert_eq!(options.timeout_ms, Some(5000));
        assert_eq!(desc, "make account");
        assert_eq!(stmts[0].status, StatementStatus::Pending);
        assert_eq!(stmts[0].line_number, 1);
    }

    #[test]
    fn test_parse_bare_call() {
        let stmts = parse("notify(input[\"name\"])");
        let StatementKind::Call { returns, .. } = &stmts[0].kind else {
            panic!("expected call");
        };
        assert!(returns.is_empty());
    }

    #[test]
    fn test_parse_var_assignment_keeps_raw_content() {
        let stmts = parse(r#"greeting := "Hi {{name}}""#);
        let StatementKind::Var { content } = &stmts[0].kind else {
            panic!("expected var");
        };
        assert_eq!(content, r#"greeting := "Hi {{name}}""#);
    }

    #[test]
    fn test_parse_return() {
        let stmts = parse("return");
        assert!(matches!(stmts[0].kind, StatementKind::Return));
    }

    #[test]
    fn test_parse_if_block_with_children() {
        let source = r#"
if e != nil {
    msg := "failed"
    return
}
done := "yes"
"#;
        let stmts = parse(source);
        assert_eq!(stmts.len(), 2);
        let StatementKind::If { condition, children } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(condition, "e != nil");
        assert_eq!(children.len(), 2);
        assert!(matches!(children[0].kind, StatementKind::Var { .. }));
        assert!(matches!(children[1].kind, StatementKind::Return));
        assert!(matches!(stmts[1].kind, StatementKind::Var { .. }));
    }

    #[test]
    fn test_nested_if_is_skipped_as_noise() {
        let source = r#"
if a == true {
    x := "kept"
    if b == true {
        y := "dropped"
    }
    z := "kept too"
}
"#;
        let stmts = parse(source);
        assert_eq!(stmts.len(), 1);
        let StatementKind::If { children, .. } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_line_numbers_track_source() {
        let source = "\nfirst := \"a\"\n\nsecond := \"b\"";
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let stmts = parse_statements(&lines, 10);
        assert_eq!(stmts[0].line_number, 11);
        assert_eq!(stmts[1].line_number, 13);
    }

    #[test]
    fn test_non_ascii_identifiers() {
        let stmts = parse("名前 := \"値\"");
        let StatementKind::Var { content } = &stmts[0].kind else {
            panic!("expected var");
        };
        assert!(content.starts_with("名前"));
    }

    #[test]
    fn test_comment_only_and_blank_lines_skipped() {
        let stmts = parse("\n// just a comment\n\nx := \"v\"\n");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn test_unquoted_input_key() {
        let arg = classify_argument("input[name]");
        assert!(arg.is_input);
        assert_eq!(arg.value, "name");
    }

    #[test]
    fn test_call_argument_with_comma_in_quotes() {
        let stmts = parse(r#"r := send("a, b", c)"#);
        let StatementKind::Call { args, .. } = &stmts[0].kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].value, r#""a, b""#);
    }
}
