//! Execution states and recorded failures.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;

/// The state of an [`Operation`](crate::operation::Operation) or
/// [`CompositeOperation`](crate::composite::CompositeOperation).
///
/// Everything starts as `NotExecuted` and moves to exactly one terminal state
/// when `run` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    NotExecuted,
    Ok,
    Error,
    Cancelled,
}

impl ExecutionState {
    /// Returns true for `Ok`, `Error` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        self != ExecutionState::NotExecuted
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionState::NotExecuted => "not executed",
            ExecutionState::Ok => "ok",
            ExecutionState::Error => "error",
            ExecutionState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Classification of a recorded failure.
///
/// `Fatal` marks internal invariant violations (including caught panics). It
/// counts as an error for state purposes but should be rendered differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warning,
    Error,
    Fatal,
    Cancelled,
}

/// A classified failure attached to the operation that produced it.
#[derive(Debug, Clone)]
pub struct ErrorContainer {
    severity: Severity,
    operation_id: String,
    resource: Option<String>,
    message: String,
    cause: Option<Arc<Error>>,
}

impl ErrorContainer {
    /// Wraps `cause` raised by `operation_id`, optionally scoped to one resource.
    pub fn from_error(
        operation_id: &str,
        resource: Option<&str>,
        message: String,
        cause: Error,
    ) -> Self {
        Self {
            severity: cause.severity(),
            operation_id: operation_id.to_string(),
            resource: resource.map(str::to_string),
            message,
            cause: Some(Arc::new(cause)),
        }
    }

    /// A warning with no underlying error.
    pub fn warning(operation_id: &str, resource: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            operation_id: operation_id.to_string(),
            resource: resource.map(str::to_string),
            message: message.into(),
            cause: None,
        }
    }

    /// A fatal failure that has no `Error` value, such as a caught panic.
    pub fn fatal(operation_id: &str, resource: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            operation_id: operation_id.to_string(),
            resource: resource.map(str::to_string),
            message: message.into(),
            cause: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// The resource (path or URL) this failure is scoped to, if any.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Short, user-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    pub fn is_cancellation(&self) -> bool {
        self.severity == Severity::Cancelled
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Errors and fatal failures move an operation to the ERROR state.
    pub fn is_failure(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for ErrorContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.operation_id, self.message)
    }
}

/// Derives the terminal state from the failures recorded during a run.
///
/// Cancellation wins over errors: a run that observed cancellation ends
/// `Cancelled` regardless of errors recorded before it.
pub fn terminal_state(errors: &[ErrorContainer]) -> ExecutionState {
    if errors.iter().any(ErrorContainer::is_cancellation) {
        ExecutionState::Cancelled
    } else if errors.iter().any(ErrorContainer::is_failure) {
        ExecutionState::Error
    } else {
        ExecutionState::Ok
    }
}
