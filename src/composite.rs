//! # Composite Operations
//!
//! A [`CompositeOperation`] is an ordered list of [`Operation`]s, each with the
//! set of earlier operations it depends on. `run` walks the list in insertion
//! order:
//!
//! 1. Once cancellation has been observed, every remaining operation is
//!    skipped and left `NotExecuted`.
//! 2. An operation whose dependencies did not all end `Ok` is skipped and left
//!    `NotExecuted`. Skipping records no error of its own.
//! 3. Otherwise the operation runs. Its failures stay contained in it.
//!
//! The aggregate state is `Cancelled` if cancellation was observed, else
//! `Error` if any operation that ran ended in error, else `Ok`.
//!
//! Insertion order is execution order. Dependencies are expressed with
//! [`OperationHandle`]s, which are only issued for operations already added
//! to the same composite, so forward references and cycles cannot be built.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::console::ConsoleSink;
use crate::error::{Error, Result};
use crate::messages;
use crate::operation::{Action, Operation, OperationScope};
use crate::progress::{ProgressReporter, SubProgress};
use crate::status::{ErrorContainer, ExecutionState, Severity};

static NEXT_COMPOSITE_ID: AtomicU64 = AtomicU64::new(1);

/// Refers to an operation inside the composite that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle {
    composite: u64,
    index: usize,
}

impl OperationHandle {
    /// Position of the operation in its composite.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Why an operation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency did not end `Ok`.
    Dependency,
    /// Cancellation was observed before the operation started.
    Cancelled,
}

struct Entry {
    operation: Operation,
    dependencies: Vec<usize>,
    skipped: Option<SkipReason>,
}

/// An ordered, dependency-gated sequence of operations run as one job.
pub struct CompositeOperation {
    uid: u64,
    name: String,
    entries: Vec<Entry>,
    console: Option<Arc<dyn ConsoleSink>>,
    state: ExecutionState,
    errors: Vec<ErrorContainer>,
}

impl std::fmt::Debug for CompositeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeOperation")
            .field("name", &self.name)
            .field("operations", &self.entries.len())
            .field("state", &self.state)
            .finish()
    }
}

impl CompositeOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: NEXT_COMPOSITE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            entries: Vec::new(),
            console: None,
            state: ExecutionState::NotExecuted,
            errors: Vec::new(),
        }
    }

    /// Sends the console echo of every member, present and future, to `console`.
    #[must_use]
    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        for entry in &mut self.entries {
            entry.operation.set_console(console.clone());
        }
        self.console = Some(console);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an operation with no dependencies.
    pub fn add(&mut self, operation: Operation) -> OperationHandle {
        self.push(operation, Vec::new())
    }

    /// Wraps `action` in an operation and appends it.
    pub fn add_action(&mut self, action: impl Action + 'static) -> OperationHandle {
        self.add(Operation::new(action))
    }

    /// Appends an operation that only runs if every dependency ended `Ok`.
    ///
    /// Fails if a handle was issued by another composite.
    pub fn add_with_dependencies(
        &mut self,
        operation: Operation,
        dependencies: &[OperationHandle],
    ) -> Result<OperationHandle> {
        let mut indices = Vec::with_capacity(dependencies.len());
        for handle in dependencies {
            if handle.composite != self.uid || handle.index >= self.entries.len() {
                return Err(Error::InvalidDependency {
                    operation: operation.id().to_string(),
                    message: format!(
                        "dependency #{} is not a member of composite '{}'",
                        handle.index, self.name
                    ),
                });
            }
            if !indices.contains(&handle.index) {
                indices.push(handle.index);
            }
        }
        Ok(self.push(operation, indices))
    }

    fn push(&mut self, mut operation: Operation, dependencies: Vec<usize>) -> OperationHandle {
        if let Some(console) = &self.console {
            operation.set_console(console.clone());
        }
        self.entries.push(Entry {
            operation,
            dependencies,
            skipped: None,
        });
        OperationHandle {
            composite: self.uid,
            index: self.entries.len() - 1,
        }
    }

    /// Returns the operation behind `handle`, if it belongs to this composite.
    pub fn operation(&self, handle: OperationHandle) -> Option<&Operation> {
        if handle.composite != self.uid {
            return None;
        }
        self.entries.get(handle.index).map(|entry| &entry.operation)
    }

    pub fn operation_mut(&mut self, handle: OperationHandle) -> Option<&mut Operation> {
        if handle.composite != self.uid {
            return None;
        }
        self.entries
            .get_mut(handle.index)
            .map(|entry| &mut entry.operation)
    }

    /// Operations in execution order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter().map(|entry| &entry.operation)
    }

    /// Why the operation behind `handle` was skipped in the last run, if it was.
    pub fn skipped(&self, handle: OperationHandle) -> Option<SkipReason> {
        if handle.composite != self.uid {
            return None;
        }
        self.entries.get(handle.index).and_then(|entry| entry.skipped)
    }

    /// Sum of member weights: the units this composite reports.
    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|entry| entry.operation.weight()).sum()
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.state
    }

    /// The union of all members' recorded failures, in execution order.
    pub fn errors(&self) -> &[ErrorContainer] {
        &self.errors
    }

    /// Runs every member in order and returns the aggregate state.
    pub fn run(&mut self, progress: &dyn ProgressReporter) -> ExecutionState {
        info!("Running composite '{}' ({} operations)", self.name, self.entries.len());
        progress.begin_task(&self.name, self.total_weight());
        let mut cancelled = false;

        for index in 0..self.entries.len() {
            let weight = self.entries[index].operation.weight();
            // Skipped operations consume their share when `sub` drops.
            let sub = SubProgress::new(progress, weight);

            cancelled = cancelled || progress.is_cancelled();
            let blocked_by = self.entries[index]
                .dependencies
                .iter()
                .copied()
                .find(|dep| self.entries[*dep].operation.execution_state() != ExecutionState::Ok);

            let skip = if cancelled {
                debug!("Skipping {}: cancelled", self.entries[index].operation.id());
                Some(SkipReason::Cancelled)
            } else if let Some(dep) = blocked_by {
                debug!(
                    "Skipping {}: dependency {} did not succeed",
                    self.entries[index].operation.id(),
                    self.entries[dep].operation.id()
                );
                Some(SkipReason::Dependency)
            } else {
                None
            };

            let entry = &mut self.entries[index];
            entry.skipped = skip;
            if skip.is_some() {
                entry.operation.reset();
                continue;
            }
            if entry.operation.run(&sub) == ExecutionState::Cancelled {
                cancelled = true;
            }
        }

        self.errors = self
            .entries
            .iter()
            .flat_map(|entry| entry.operation.errors().iter().cloned())
            .collect();
        self.state = if cancelled || progress.is_cancelled() {
            ExecutionState::Cancelled
        } else if self
            .entries
            .iter()
            .any(|entry| entry.operation.execution_state() == ExecutionState::Error)
        {
            ExecutionState::Error
        } else {
            ExecutionState::Ok
        };
        info!("Composite '{}' finished: {}", self.name, self.state);
        self.state
    }

    /// Counts and per-operation detail of the last run.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            name: self.name.clone(),
            state: self.state,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            skipped: 0,
            operations: Vec::with_capacity(self.entries.len()),
        };
        for entry in &self.entries {
            let operation = &entry.operation;
            match (entry.skipped, operation.execution_state()) {
                (Some(_), _) => summary.skipped += 1,
                (None, ExecutionState::Ok) => summary.succeeded += 1,
                (None, ExecutionState::Error) => summary.failed += 1,
                (None, ExecutionState::Cancelled) => summary.cancelled += 1,
                (None, ExecutionState::NotExecuted) => {}
            }
            summary.operations.push(OperationSummary {
                id: operation.id().to_string(),
                name: operation.name(),
                state: operation.execution_state(),
                skipped: entry.skipped,
                errors: operation.errors().iter().map(ErrorSummary::from).collect(),
                failed_resources: operation.failed_resources(),
            });
        }
        summary
    }
}

impl Action for CompositeOperation {
    fn message_key(&self) -> &str {
        messages::COMPOSITE
    }

    fn weight(&self) -> u64 {
        self.total_weight().max(1)
    }

    fn resources(&self) -> Vec<String> {
        self.operations().flat_map(Operation::resources).collect()
    }

    fn failed_resources(&self, _errors: &[ErrorContainer]) -> Vec<String> {
        self.operations().flat_map(Operation::failed_resources).collect()
    }

    /// Runs the nested composite and forwards its failures to the outer operation.
    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        self.run(scope.progress());
        for container in &self.errors {
            scope.report(container.clone());
        }
        Ok(())
    }
}

/// Runs independent composites one after another.
pub fn run_sequentially(
    composites: &mut [CompositeOperation],
    progress: &dyn ProgressReporter,
) -> Vec<ExecutionState> {
    let total = composites.iter().map(CompositeOperation::total_weight).sum();
    progress.begin_task("jobs", total);
    composites
        .iter_mut()
        .map(|composite| {
            let sub = SubProgress::new(progress, composite.total_weight());
            composite.run(&sub)
        })
        .collect()
}

/// Runs independent composites on the rayon pool.
///
/// Each composite stays strictly sequential internally. The only state they
/// share is whatever their operations share, typically location proxy pools.
pub fn run_concurrently(
    composites: &mut [CompositeOperation],
    progress: &dyn ProgressReporter,
) -> Vec<ExecutionState> {
    let total = composites.iter().map(CompositeOperation::total_weight).sum();
    progress.begin_task("jobs", total);
    composites
        .par_iter_mut()
        .map(|composite| {
            let sub = SubProgress::new(progress, composite.total_weight());
            composite.run(&sub)
        })
        .collect()
}

/// Outcome of one composite run, for display and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub state: ExecutionState,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub operations: Vec<OperationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub id: String,
    pub name: String,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&ErrorContainer> for ErrorSummary {
    fn from(container: &ErrorContainer) -> Self {
        Self {
            severity: container.severity(),
            resource: container.resource().map(str::to_string),
            message: container.message().to_string(),
            cause: container.cause().map(ToString::to_string),
        }
    }
}
