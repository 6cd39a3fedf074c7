use thiserror::Error;

/// Errors surfaced by the flow engine.
///
/// Parse noise never reaches this enum: a structurally broken flow carries
/// `success=false` on its model and surfaces here as `InvalidFlow` only when
/// someone tries to start it.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow '{flow_id}' failed to parse: {message}")]
    InvalidFlow { flow_id: String, message: String },

    #[error("flow '{0}' is already running")]
    AlreadyRunning(String),

    #[error("flow '{0}' is not running")]
    NotRunning(String),

    #[error("step '{function}' not found (line {line})")]
    StepNotFound { function: String, line: usize },

    #[error("step '{step}' failed after {attempts} attempt(s): {message}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        message: String,
    },

    #[error("flow '{0}' was cancelled")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    // === Display Tests ===

    #[test]
    fn invalid_flow_displays_message() {
        let err = FlowError::InvalidFlow {
            flow_id: "f1".into(),
            message: "unterminated main block".into(),
        };
        assert_eq!(
            err.to_string(),
            "flow 'f1' failed to parse: unterminated main block"
        );
    }

    #[test]
    fn step_not_found_displays_line() {
        let err = FlowError::StepNotFound {
            function: "lookup".into(),
            line: 12,
        };
        assert_eq!(err.to_string(), "step 'lookup' not found (line 12)");
    }

    #[test]
    fn retries_exhausted_displays_attempts() {
        let err = FlowError::RetriesExhausted {
            step: "charge".into(),
            attempts: 3,
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "step 'charge' failed after 3 attempt(s): connection refused"
        );
    }

    #[test]
    fn registry_errors_display_flow_id() {
        assert_eq!(
            FlowError::AlreadyRunning("f1".into()).to_string(),
            "flow 'f1' is already running"
        );
        assert_eq!(
            FlowError::NotRunning("f2".into()).to_string(),
            "flow 'f2' is not running"
        );
        assert_eq!(
            FlowError::Cancelled("f3".into()).to_string(),
            "flow 'f3' was cancelled"
        );
    }
}
