//! # Operations and Step Containment
//!
//! An [`Operation`] is the atomic unit of work: a named, independently runnable
//! [`Action`] together with its execution state and the failures recorded
//! while it ran.
//!
//! ## Execution Model
//!
//! `Operation::run` resets the state, hands the action an [`OperationScope`]
//! and derives the terminal state from what was recorded:
//!
//! - any cancellation recorded → `Cancelled`
//! - otherwise any error or fatal failure recorded → `Error`
//! - otherwise → `Ok` (warnings do not change the state)
//!
//! Nothing escapes `run`. An `Err` returned by the action, or a panic raised by
//! it, is turned into an [`ErrorContainer`] like any other failure.
//!
//! ## Protected Steps
//!
//! Inside an action, each unit of work that may fail independently (usually
//! one resource of a loop) runs through [`OperationScope::protect_step`] or
//! [`OperationScope::protect_resource_step`]. A failing step is recorded and
//! the action carries on with the next one, so one bad resource never stops
//! its siblings. Cancellation is polled at the top of every step: once it is
//! observed, the remaining steps are skipped and a single cancellation is
//! recorded.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::console::{ConsoleLevel, ConsoleSink, NullConsole};
use crate::error::{Error, Result};
use crate::messages;
use crate::progress::{ProgressReporter, SubProgress};
use crate::status::{terminal_state, ErrorContainer, ExecutionState, Severity};

/// Progress units an action occupies in its composite unless it says otherwise.
pub const DEFAULT_WEIGHT: u64 = 1;

/// Upcast helper so `Operation::action` can hand back the concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The body of an operation.
///
/// Input data (resources, parameters) is bound when the action is
/// constructed. `execute` may be called again when the owning operation is
/// re-run, so it should not consume its inputs.
pub trait Action: AsAny + Send {
    /// Message key naming this kind of action, such as `Operation_Cleanup`.
    fn message_key(&self) -> &str;

    /// Share of its composite's progress this action occupies.
    fn weight(&self) -> u64 {
        DEFAULT_WEIGHT
    }

    /// The original input set, for reporting and retrying failed items.
    fn resources(&self) -> Vec<String> {
        Vec::new()
    }

    /// Inputs affected by the recorded failures, in input order.
    ///
    /// The default matches each resource against the resource a failure was
    /// scoped to.
    fn failed_resources(&self, errors: &[ErrorContainer]) -> Vec<String> {
        self.resources()
            .into_iter()
            .filter(|resource| {
                errors
                    .iter()
                    .any(|e| e.is_failure() && e.resource() == Some(resource.as_str()))
            })
            .collect()
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()>;
}

/// What an action sees while it runs.
pub struct OperationScope<'a> {
    operation_id: &'a str,
    message_key: &'a str,
    progress: &'a dyn ProgressReporter,
    console: &'a dyn ConsoleSink,
    errors: &'a mut Vec<ErrorContainer>,
}

impl<'a> OperationScope<'a> {
    pub fn new(
        operation_id: &'a str,
        message_key: &'a str,
        progress: &'a dyn ProgressReporter,
        console: &'a dyn ConsoleSink,
        errors: &'a mut Vec<ErrorContainer>,
    ) -> Self {
        Self {
            operation_id,
            message_key,
            progress,
            console,
            errors,
        }
    }

    pub fn operation_id(&self) -> &str {
        self.operation_id
    }

    pub fn progress(&self) -> &'a dyn ProgressReporter {
        self.progress
    }

    pub fn console(&self) -> &'a dyn ConsoleSink {
        self.console
    }

    pub fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled()
    }

    /// Starts the operation's own task on its reporter.
    pub fn begin_task(&self, label: &str, total_units: u64) {
        self.progress.begin_task(label, total_units);
    }

    pub fn set_task_label(&self, label: &str) {
        self.progress.set_task_label(label);
    }

    pub fn write_to_console(&self, level: ConsoleLevel, text: &str) {
        self.console.write(level, text);
    }

    /// Runs `step` under containment with a share of `units` of the current task.
    ///
    /// Returns true if the step completed. A step is not started once
    /// cancellation has been requested.
    pub fn protect_step<F>(&mut self, units: u64, step: F) -> bool
    where
        F: FnOnce(&dyn ProgressReporter) -> Result<()>,
    {
        self.protect(None, units, step)
    }

    /// Like [`protect_step`](Self::protect_step), with failures attributed to `resource`.
    pub fn protect_resource_step<F>(&mut self, resource: &str, units: u64, step: F) -> bool
    where
        F: FnOnce(&dyn ProgressReporter) -> Result<()>,
    {
        self.protect(Some(resource), units, step)
    }

    fn protect<F>(&mut self, resource: Option<&str>, units: u64, step: F) -> bool
    where
        F: FnOnce(&dyn ProgressReporter) -> Result<()>,
    {
        // Dropping `sub` consumes its share on every path, skipped steps included.
        let sub = SubProgress::new(self.progress, units);
        if self.progress.is_cancelled() {
            self.record_cancellation(resource);
            return false;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| step(&sub))) {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                self.report_error(resource, err);
                false
            }
            Err(payload) => {
                self.report_panic(resource, payload);
                false
            }
        }
    }

    /// Records `err`, classified by its severity.
    pub fn report_error(&mut self, resource: Option<&str>, err: Error) {
        if err.is_cancellation() {
            self.record_cancellation(resource);
            return;
        }
        let message = messages::short_error_message(self.message_key, resource, &err);
        if err.severity() == Severity::Fatal {
            error!("[{}] {}: {}", self.operation_id, message, err);
        } else {
            warn!("[{}] {}: {}", self.operation_id, message, err);
        }
        self.console
            .write(ConsoleLevel::Error, &format!("{}: {}", message, err));
        self.errors.push(ErrorContainer::from_error(
            self.operation_id,
            resource,
            message,
            err,
        ));
    }

    /// Records a warning. Warnings do not change the terminal state.
    pub fn report_warning(&mut self, resource: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", self.operation_id, message);
        self.console.write(ConsoleLevel::Warning, &message);
        self.errors
            .push(ErrorContainer::warning(self.operation_id, resource, message));
    }

    /// Records an already-built container, as a nested composite does with its
    /// children's failures.
    pub fn report(&mut self, container: ErrorContainer) {
        self.errors.push(container);
    }

    fn report_panic(&mut self, resource: Option<&str>, payload: Box<dyn Any + Send>) {
        let detail = panic_message(payload.as_ref());
        let message = format!(
            "{}: internal failure: {}",
            messages::operation_name(self.message_key),
            detail
        );
        error!("[{}] {}", self.operation_id, message);
        self.console.write(ConsoleLevel::Error, &message);
        self.errors
            .push(ErrorContainer::fatal(self.operation_id, resource, message));
    }

    /// Records the first observed cancellation. Later ones add nothing.
    fn record_cancellation(&mut self, resource: Option<&str>) {
        if self.errors.iter().any(ErrorContainer::is_cancellation) {
            return;
        }
        debug!("[{}] cancellation observed", self.operation_id);
        self.console.mark_cancelled();
        let err = Error::cancelled(self.operation_id.to_string());
        let message = messages::short_error_message(self.message_key, resource, &err);
        self.errors.push(ErrorContainer::from_error(
            self.operation_id,
            resource,
            message,
            err,
        ));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A runnable action with its execution state and recorded failures.
pub struct Operation {
    id: String,
    message_key: String,
    action: Box<dyn Action>,
    console: Arc<dyn ConsoleSink>,
    state: ExecutionState,
    errors: Vec<ErrorContainer>,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("message_key", &self.message_key)
            .field("state", &self.state)
            .field("errors", &self.errors.len())
            .finish()
    }
}

impl Operation {
    /// Wraps `action`. The id defaults to the action's message key.
    pub fn new(action: impl Action + 'static) -> Self {
        Self::from_boxed(Box::new(action))
    }

    pub fn from_boxed(action: Box<dyn Action>) -> Self {
        let message_key = action.message_key().to_string();
        Self {
            id: message_key.clone(),
            message_key,
            action,
            console: Arc::new(NullConsole),
            state: ExecutionState::NotExecuted,
            errors: Vec::new(),
        }
    }

    /// Sets a stable id, such as the one declared in a plan.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }

    pub fn set_console(&mut self, console: Arc<dyn ConsoleSink>) {
        self.console = console;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message_key(&self) -> &str {
        &self.message_key
    }

    /// Human-readable name resolved from the message key.
    pub fn name(&self) -> String {
        messages::operation_name(&self.message_key)
    }

    pub fn weight(&self) -> u64 {
        self.action.weight()
    }

    pub fn resources(&self) -> Vec<String> {
        self.action.resources()
    }

    /// The last terminal state, or `NotExecuted` before any run.
    pub fn execution_state(&self) -> ExecutionState {
        self.state
    }

    /// Failures and warnings recorded by the last run.
    pub fn errors(&self) -> &[ErrorContainer] {
        &self.errors
    }

    /// Resources with a recorded error, in input order, for retrying.
    pub fn failed_resources(&self) -> Vec<String> {
        self.action.failed_resources(&self.errors)
    }

    /// Returns the action if it is an `A`.
    pub fn action<A: Action>(&self) -> Option<&A> {
        AsAny::as_any(&*self.action).downcast_ref::<A>()
    }

    pub fn action_mut<A: Action>(&mut self) -> Option<&mut A> {
        AsAny::as_any_mut(&mut *self.action).downcast_mut::<A>()
    }

    /// Forgets the last run.
    pub fn reset(&mut self) {
        self.state = ExecutionState::NotExecuted;
        self.errors.clear();
    }

    /// Runs the action and returns the terminal state. Never panics or fails.
    pub fn run(&mut self, progress: &dyn ProgressReporter) -> ExecutionState {
        self.reset();
        let name = self.name();
        info!("Running {} ({})", self.id, name);
        self.console.mark_start(&name);

        let Self {
            id,
            message_key,
            action,
            console,
            errors,
            ..
        } = self;
        let mut scope = OperationScope::new(id, message_key, progress, &**console, errors);
        match panic::catch_unwind(AssertUnwindSafe(|| action.execute(&mut scope))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => scope.report_error(None, err),
            Err(payload) => scope.report_panic(None, payload),
        }
        if progress.is_cancelled() {
            scope.record_cancellation(None);
        }

        self.console.mark_end();
        self.state = terminal_state(&self.errors);
        info!("{} finished: {}", self.id, self.state);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryConsole;
    use crate::progress::{CancellationFlag, NullProgress};
    use crate::testing::{RecordingProgress, ScriptedAction, StepOutcome};

    #[test]
    fn test_new_operation_is_not_executed() {
        let op = Operation::new(ScriptedAction::ok(&["/wc/a"]));
        assert_eq!(op.execution_state(), ExecutionState::NotExecuted);
        assert!(op.errors().is_empty());
        assert_eq!(op.weight(), DEFAULT_WEIGHT);
        assert_eq!(op.resources(), vec!["/wc/a".to_string()]);
    }

    #[test]
    fn test_all_steps_ok() {
        let mut op = Operation::new(ScriptedAction::ok(&["/wc/a", "/wc/b"])).with_id("cleanup");
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(op.id(), "cleanup");
        let action = op.action::<ScriptedAction>().unwrap();
        assert_eq!(action.attempted(), vec!["/wc/a", "/wc/b"]);
    }

    #[test]
    fn test_one_failing_step_does_not_stop_siblings() {
        let action = ScriptedAction::new(&[
            ("/wc/a", StepOutcome::Ok),
            ("/wc/b", StepOutcome::Fail),
            ("/wc/c", StepOutcome::Ok),
        ]);
        let mut op = Operation::new(action);
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(
            op.action::<ScriptedAction>().unwrap().attempted(),
            vec!["/wc/a", "/wc/b", "/wc/c"]
        );
        assert_eq!(op.errors().len(), 1);
        assert_eq!(op.errors()[0].resource(), Some("/wc/b"));
        assert_eq!(op.failed_resources(), vec!["/wc/b".to_string()]);
    }

    #[test]
    fn test_panicking_step_is_contained_as_fatal() {
        let action = ScriptedAction::new(&[("/wc/a", StepOutcome::Panic), ("/wc/b", StepOutcome::Ok)]);
        let mut op = Operation::new(action);
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(op.errors().len(), 1);
        assert!(op.errors()[0].is_fatal());
        assert!(op.errors()[0].message().contains("scripted panic"));
        assert_eq!(op.action::<ScriptedAction>().unwrap().attempted().len(), 2);
    }

    #[test]
    fn test_error_returned_by_body_is_recorded() {
        let mut op = Operation::new(ScriptedAction::ok(&[]).failing_body());
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(op.errors().len(), 1);
        assert_eq!(op.errors()[0].resource(), None);
    }

    #[test]
    fn test_warning_keeps_state_ok() {
        let action = ScriptedAction::new(&[("/wc/a", StepOutcome::Warn)]);
        let mut op = Operation::new(action);
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(op.errors()[0].severity(), Severity::Warning);
        assert!(op.failed_resources().is_empty());
    }

    #[test]
    fn test_native_cancellation_wins_over_errors() {
        let action = ScriptedAction::new(&[
            ("/wc/a", StepOutcome::Fail),
            ("/wc/b", StepOutcome::Cancel),
            ("/wc/c", StepOutcome::Ok),
        ]);
        let mut op = Operation::new(action);
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Cancelled);
        assert!(op.errors().iter().any(ErrorContainer::is_cancellation));
    }

    #[test]
    fn test_cancellation_skips_remaining_steps() {
        let flag = CancellationFlag::new();
        let action = ScriptedAction::new(&[
            ("/wc/a", StepOutcome::Ok),
            ("/wc/b", StepOutcome::Ok),
            ("/wc/c", StepOutcome::Ok),
        ])
        .cancel_after(1, flag.clone());
        let mut op = Operation::new(action);
        let progress = NullProgress::with_cancellation(flag);
        assert_eq!(op.run(&progress), ExecutionState::Cancelled);
        assert_eq!(
            op.action::<ScriptedAction>().unwrap().attempted(),
            vec!["/wc/a"]
        );
        let cancellations = op.errors().iter().filter(|e| e.is_cancellation()).count();
        assert_eq!(cancellations, 1);
    }

    #[test]
    fn test_cancellation_after_body_is_recorded() {
        let flag = CancellationFlag::new();
        let action = ScriptedAction::ok(&["/wc/a"]).cancel_after(1, flag.clone());
        let mut op = Operation::new(action);
        let progress = NullProgress::with_cancellation(flag);
        assert_eq!(op.run(&progress), ExecutionState::Cancelled);
    }

    #[test]
    fn test_rerun_resets_state() {
        let flag = CancellationFlag::new();
        let mut op = Operation::new(ScriptedAction::ok(&["/wc/a"]));
        flag.cancel();
        assert_eq!(
            op.run(&NullProgress::with_cancellation(flag)),
            ExecutionState::Cancelled
        );
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert!(op.errors().is_empty());
    }

    #[test]
    fn test_console_markers_and_error_lines() {
        let console = Arc::new(MemoryConsole::new());
        let action = ScriptedAction::new(&[("/wc/a", StepOutcome::Fail)]);
        let mut op = Operation::new(action).with_console(console.clone());
        op.run(&NullProgress::new());
        let lines = console.lines();
        assert_eq!(lines[0].1, "*** Scripted ***");
        assert!(lines
            .iter()
            .any(|(level, text)| *level == ConsoleLevel::Error && text.contains("/wc/a")));
    }

    #[test]
    fn test_steps_consume_progress_share() {
        let progress = RecordingProgress::new();
        let action = ScriptedAction::new(&[
            ("/wc/a", StepOutcome::Ok),
            ("/wc/b", StepOutcome::Fail),
            ("/wc/c", StepOutcome::Panic),
        ]);
        let mut op = Operation::new(action);
        op.run(&progress);
        assert_eq!(progress.tasks(), vec![("Scripted".to_string(), 3)]);
        assert_eq!(progress.worked_total(), 3);
    }
}
