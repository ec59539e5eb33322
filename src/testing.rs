//! Shared test doubles for unit tests.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::location::{LocationSettings, RepositoryLocation};
use crate::memory::MemoryConnectorFactory;
use crate::messages;
use crate::operation::{Action, OperationScope};
use crate::progress::{CancellationFlag, ProgressReporter};

/// A reporter that records everything it is told.
#[derive(Default)]
pub struct RecordingProgress {
    flag: CancellationFlag,
    cancel_at: Option<u64>,
    state: Mutex<Recorded>,
}

#[derive(Default)]
struct Recorded {
    worked: u64,
    labels: Vec<String>,
    tasks: Vec<(String, u64)>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(flag: CancellationFlag) -> Self {
        Self {
            flag,
            ..Self::default()
        }
    }

    /// Cancels `flag` as soon as `units` of work have been reported.
    pub fn cancelling_at(flag: CancellationFlag, units: u64) -> Self {
        Self {
            flag,
            cancel_at: Some(units),
            ..Self::default()
        }
    }

    pub fn worked_total(&self) -> u64 {
        self.state.lock().unwrap().worked
    }

    /// Labels from `begin_task` and `set_task_label`, in order.
    pub fn labels(&self) -> Vec<String> {
        self.state.lock().unwrap().labels.clone()
    }

    /// `begin_task` calls, in order.
    pub fn tasks(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().tasks.clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }

    fn begin_task(&self, label: &str, total_units: u64) {
        let mut state = self.state.lock().unwrap();
        state.labels.push(label.to_string());
        state.tasks.push((label.to_string(), total_units));
    }

    fn set_task_label(&self, label: &str) {
        self.state.lock().unwrap().labels.push(label.to_string());
    }

    fn worked(&self, units: u64) {
        let mut state = self.state.lock().unwrap();
        state.worked += units;
        if self.cancel_at.is_some_and(|at| state.worked >= at) {
            self.flag.cancel();
        }
    }
}

/// What a scripted step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Ok,
    Warn,
    Fail,
    Cancel,
    Panic,
}

/// An action that runs one protected step per scripted resource.
pub struct ScriptedAction {
    key: String,
    weight: u64,
    steps: Vec<(String, StepOutcome)>,
    fail_body: bool,
    cancel_after: Option<(usize, CancellationFlag)>,
    attempted: Vec<String>,
    log: Option<(Arc<Mutex<Vec<String>>>, String)>,
}

impl ScriptedAction {
    pub fn new(steps: &[(&str, StepOutcome)]) -> Self {
        Self {
            key: "Scripted".to_string(),
            weight: 1,
            steps: steps
                .iter()
                .map(|(resource, outcome)| (resource.to_string(), *outcome))
                .collect(),
            fail_body: false,
            cancel_after: None,
            attempted: Vec::new(),
            log: None,
        }
    }

    pub fn ok(resources: &[&str]) -> Self {
        let steps: Vec<_> = resources.iter().map(|r| (*r, StepOutcome::Ok)).collect();
        Self::new(&steps)
    }

    /// The body itself returns an error after its steps.
    pub fn failing_body(mut self) -> Self {
        self.fail_body = true;
        self
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    /// Cancels `flag` once `steps` steps have completed.
    pub fn cancel_after(mut self, steps: usize, flag: CancellationFlag) -> Self {
        self.cancel_after = Some((steps, flag));
        self
    }

    /// Appends `name` to `log` every time the action executes.
    pub fn logging_to(mut self, log: Arc<Mutex<Vec<String>>>, name: &str) -> Self {
        self.log = Some((log, name.to_string()));
        self
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempted.clone()
    }
}

impl Action for ScriptedAction {
    fn message_key(&self) -> &str {
        &self.key
    }

    fn weight(&self) -> u64 {
        self.weight
    }

    fn resources(&self) -> Vec<String> {
        self.steps.iter().map(|(r, _)| r.clone()).collect()
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        if let Some((log, name)) = &self.log {
            log.lock().unwrap().push(name.clone());
        }
        self.attempted.clear();
        scope.begin_task(&messages::operation_name(&self.key), self.steps.len() as u64);
        for (index, (resource, outcome)) in self.steps.iter().enumerate() {
            let attempted = &mut self.attempted;
            let resource_name = resource.clone();
            let outcome = *outcome;
            let completed = scope.protect_resource_step(resource, 1, |_| {
                attempted.push(resource_name.clone());
                match outcome {
                    StepOutcome::Ok | StepOutcome::Warn => Ok(()),
                    StepOutcome::Fail => Err(Error::connector("scripted", resource_name, "failed")),
                    StepOutcome::Cancel => Err(Error::cancelled(resource_name)),
                    StepOutcome::Panic => panic!("scripted panic on {}", resource_name),
                }
            });
            if completed && outcome == StepOutcome::Warn {
                scope.report_warning(Some(resource.as_str()), "scripted warning");
            }
            if let Some((after, flag)) = &self.cancel_after {
                if index + 1 == *after {
                    flag.cancel();
                }
            }
        }
        if self.fail_body {
            return Err(Error::connector("scripted", "body", "failed"));
        }
        Ok(())
    }
}

/// A location backed by a fresh in-memory repository that already has `url`.
pub fn memory_location(id: &str, url: &str) -> (Arc<MemoryConnectorFactory>, Arc<RepositoryLocation>) {
    let factory = Arc::new(MemoryConnectorFactory::new());
    factory.repository().add_remote(url);
    let location = RepositoryLocation::new(id, LocationSettings::new(url), factory.clone()).unwrap();
    (factory, Arc::new(location))
}

/// A second location sharing `factory`'s repository.
pub fn shared_location(
    factory: &Arc<MemoryConnectorFactory>,
    id: &str,
    url: &str,
) -> Arc<RepositoryLocation> {
    factory.repository().add_remote(url);
    Arc::new(RepositoryLocation::new(id, LocationSettings::new(url), factory.clone()).unwrap())
}
