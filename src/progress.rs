//! # Progress Reporting and Cancellation
//!
//! Every operation reports progress and polls for cancellation through the
//! [`ProgressReporter`] trait. Cancellation is cooperative: a shared
//! [`CancellationFlag`] is set by whoever wants the work to stop and is polled
//! at well-defined points (before each operation of a composite, before each
//! protected step). Nothing is interrupted mid-call.
//!
//! ## Scoped Progress
//!
//! [`SubProgress`] lets a parent hand a fixed share of its units to a child.
//! The child announces its own total with `begin_task`, and its `worked` calls
//! are rescaled onto the parent share. When the `SubProgress` is dropped, any
//! part of the share that was not consumed is consumed, so the parent total
//! stays consistent whether the child succeeded, failed or was skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};

/// Cooperative cancellation and progress sink consumed by every operation.
///
/// Implementations must tolerate being queried and updated from the worker
/// driving a composite. Methods take `&self`; implementations use interior
/// mutability.
pub trait ProgressReporter: Send + Sync {
    /// Returns true once cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Starts a task with a fixed number of units.
    fn begin_task(&self, label: &str, total_units: u64);

    /// Replaces the label shown for the current task.
    fn set_task_label(&self, label: &str);

    /// Reports `units` of completed work.
    fn worked(&self, units: u64);
}

/// A thread-safe, clonable cancellation flag.
///
/// All clones share the same underlying flag. Once set, it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A reporter that discards progress and only answers cancellation queries.
#[derive(Debug, Clone, Default)]
pub struct NullProgress {
    flag: CancellationFlag,
}

impl NullProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reporter observing `flag`.
    pub fn with_cancellation(flag: CancellationFlag) -> Self {
        Self { flag }
    }
}

impl ProgressReporter for NullProgress {
    fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }

    fn begin_task(&self, _label: &str, _total_units: u64) {}

    fn set_task_label(&self, _label: &str) {}

    fn worked(&self, _units: u64) {}
}

#[derive(Debug, Default)]
struct SubState {
    total: u64,
    done: u64,
    reported: u64,
}

/// A child reporter that owns `share` units of its parent's task.
pub struct SubProgress<'a> {
    parent: &'a dyn ProgressReporter,
    share: u64,
    state: Mutex<SubState>,
}

impl<'a> SubProgress<'a> {
    pub fn new(parent: &'a dyn ProgressReporter, share: u64) -> Self {
        Self {
            parent,
            share,
            state: Mutex::new(SubState::default()),
        }
    }

    /// Consumes the remainder of the share. Calling it more than once is harmless.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = self.share.saturating_sub(state.reported);
        if remaining > 0 {
            self.parent.worked(remaining);
        }
        state.reported = self.share;
        state.done = state.total;
    }

    /// Units of the parent share already reported.
    pub fn reported(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reported
    }
}

impl ProgressReporter for SubProgress<'_> {
    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }

    fn begin_task(&self, label: &str, total_units: u64) {
        self.parent.set_task_label(label);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.total = total_units;
        state.done = 0;
    }

    fn set_task_label(&self, label: &str) {
        self.parent.set_task_label(label);
    }

    fn worked(&self, units: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.total == 0 {
            return;
        }
        state.done = state.done.saturating_add(units).min(state.total);
        let target = (u128::from(self.share) * u128::from(state.done) / u128::from(state.total)) as u64;
        if target > state.reported {
            self.parent.worked(target - state.reported);
            state.reported = target;
        }
    }
}

impl Drop for SubProgress<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// A terminal progress bar backed by `indicatif`.
pub struct BarProgress {
    bar: ProgressBar,
    flag: CancellationFlag,
}

impl BarProgress {
    /// Creates a visible progress bar observing `flag`.
    pub fn new(flag: CancellationFlag) -> Self {
        let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar, flag }
    }

    /// Creates a bar that never draws, for quiet or non-interactive runs.
    pub fn hidden(flag: CancellationFlag) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            flag,
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    /// Clears the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for BarProgress {
    fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }

    fn begin_task(&self, label: &str, total_units: u64) {
        self.bar.set_length(total_units);
        self.bar.set_position(0);
        self.bar.set_message(label.to_string());
    }

    fn set_task_label(&self, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn worked(&self, units: u64) {
        self.bar.inc(units);
    }
}
