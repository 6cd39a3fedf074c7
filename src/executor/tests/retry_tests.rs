//! Retry and continuation policy.

use std::sync::Arc;
use std::time::Duration;

use maplit::hashmap;

use super::helpers::{parse_ok, PerStepHandler, RecordingObserver, ScriptedHandler};
use crate::error::FlowError;
use crate::executor::Executor;
use crate::types::{StatementStatus, Val};

fn quick_executor(handler: Arc<ScriptedHandler>) -> Executor {
    Executor::new(handler).with_retry_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_retry_exhaustion_counts_attempts() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o");

main {
    out := step1() {retry: 3}
}
"#;
    let mut flow = parse_ok("retry-1", source);
    let handler = Arc::new(ScriptedHandler::always_failing());
    let exec = quick_executor(handler.clone());

    let err = exec.start(&mut flow).await.unwrap_err();

    // retry: 3 means one initial attempt plus three retries.
    assert_eq!(handler.call_count(), 4);
    match err {
        FlowError::RetriesExhausted { attempts, step, .. } => {
            assert_eq!(attempts, 4);
            assert_eq!(step, "step1");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(flow.main_func.statements[0].status, StatementStatus::Failed);
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o");

main {
    out := step1()
}
"#;
    let mut flow = parse_ok("retry-2", source);
    let handler = Arc::new(ScriptedHandler::always_failing());
    let exec = quick_executor(handler.clone());

    exec.start(&mut flow).await.unwrap_err();
    assert_eq!(handler.call_count(), 1);
}

#[tokio::test]
async fn test_err_continue_skips_retries_and_continues() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o");
step2 = svc.ops.pull() -> (res: string "r");

main {
    out := step1() {retry: 5, err_continue: true}
    res := step2()
}
"#;
    let mut flow = parse_ok("continue-1", source);
    let handler = Arc::new(PerStepHandler::failing_steps(&["step1"]));
    let observer = Arc::new(RecordingObserver::default());
    let exec = Executor::new(handler.clone())
        .with_retry_backoff(Duration::from_millis(1))
        .with_observer(observer.clone());

    exec.start(&mut flow).await.unwrap();

    // err_continue wins before any retry is attempted.
    assert_eq!(handler.call_names(), vec!["step1", "step2"]);
    assert_eq!(
        flow.main_func.statements[0].status,
        StatementStatus::FailedContinue
    );
    assert_eq!(
        flow.main_func.statements[1].status,
        StatementStatus::Completed
    );
    assert_eq!(observer.complete_count(), 1);
}

#[tokio::test]
async fn test_err_continue_from_step_metadata() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o") {err_continue: true};
step2 = svc.ops.pull() -> (res: string "r");

main {
    out := step1()
    res := step2()
}
"#;
    let mut flow = parse_ok("continue-2", source);
    let handler = Arc::new(PerStepHandler::failing_steps(&["step1"]));
    let exec = Executor::new(handler.clone()).with_retry_backoff(Duration::from_millis(1));

    exec.start(&mut flow).await.unwrap();

    assert_eq!(handler.call_names(), vec!["step1", "step2"]);
    assert_eq!(
        flow.main_func.statements[0].status,
        StatementStatus::FailedContinue
    );
}

#[tokio::test]
async fn test_call_site_err_continue_overrides_step_metadata() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o") {err_continue: true};

main {
    out := step1() {err_continue: false}
}
"#;
    let mut flow = parse_ok("continue-3", source);
    let handler = Arc::new(ScriptedHandler::always_failing());
    let exec = quick_executor(handler.clone());

    let err = exec.start(&mut flow).await.unwrap_err();
    assert!(matches!(err, FlowError::RetriesExhausted { .. }));
    assert_eq!(flow.main_func.statements[0].status, StatementStatus::Failed);
}

#[tokio::test]
async fn test_failed_step_does_not_bind_outputs() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o");

main {
    out := step1() {err_continue: true}
}
"#;
    let mut flow = parse_ok("continue-4", source);
    let handler = Arc::new(ScriptedHandler::always_failing());
    let exec = quick_executor(handler);

    exec.start(&mut flow).await.unwrap();
    assert!(!flow.variables.contains_key("out"));
}

#[tokio::test]
async fn test_recovery_within_retry_budget_binds_outputs() {
    let source = r#"
step1 = svc.ops.push() -> (out: string "o");

main {
    out := step1() {retry: 2}
}
"#;
    let mut flow = parse_ok("retry-3", source);
    let handler = Arc::new(ScriptedHandler::failing_then(
        1,
        hashmap! { "out".to_string() => Val::Str("ok".into()) },
    ));
    let exec = quick_executor(handler.clone());

    exec.start(&mut flow).await.unwrap();

    assert_eq!(handler.call_count(), 2);
    assert_eq!(flow.variables["out"].value, Val::Str("ok".into()));
    assert_eq!(
        flow.main_func.statements[0].status,
        StatementStatus::Completed
    );
}
