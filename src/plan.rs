//! Building runnable jobs from a parsed plan.
//!
//! A [`Plan`] owns everything one run needs: the in-memory repository seeded
//! from the plan's `simulation` section, a [`LocationRegistry`] holding one
//! location per `locations` entry, and one [`CompositeOperation`] per job
//! whose `depends_on` ids have been turned into operation handles.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::composite::{run_concurrently, run_sequentially, CompositeOperation, OperationHandle, RunSummary};
use crate::config::{self, JobConfig, OperationKind, PlanConfig, SimulationConfig};
use crate::connector::{ConnectorFactory, PropertyData};
use crate::console::ConsoleSink;
use crate::error::{Error, Result};
use crate::location::RepositoryLocation;
use crate::memory::{MemoryConnectorFactory, MemoryRepository};
use crate::operation::{Action, Operation};
use crate::operations::{
    CheckoutOperation, CleanupOperation, CommitOperation, CreateFolderOperation, LockOperation,
    RelocateOperation, RemovePropertiesOperation, RevertOperation, SetPropertiesOperation,
    SwitchOperation, SwitchTarget, UnlockOperation, UpdateOperation, WorkingCopy,
};
use crate::progress::ProgressReporter;
use crate::registry::LocationRegistry;
use crate::status::ExecutionState;

/// A plan ready to run.
pub struct Plan {
    factory: Arc<MemoryConnectorFactory>,
    registry: LocationRegistry,
    jobs: Vec<CompositeOperation>,
}

impl Plan {
    /// Seeds the simulated repository, registers the locations and builds one
    /// composite per job. Every operation echoes to `console`.
    pub fn build(plan: &PlanConfig, console: Arc<dyn ConsoleSink>) -> Result<Self> {
        plan.validate()?;
        let factory = Arc::new(MemoryConnectorFactory::new());
        seed(factory.repository(), plan);

        let connector_factory: Arc<dyn ConnectorFactory> = factory.clone();
        let registry = LocationRegistry::new(connector_factory)
            .with_cache_size(plan.settings.proxy_cache_size);
        for location in &plan.locations {
            registry.add(&location.id, location.settings())?;
        }

        let jobs = plan
            .jobs
            .iter()
            .map(|job| build_job(job, &registry, console.clone()))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Built {} job(s) over {} location(s)",
            jobs.len(),
            plan.locations.len()
        );
        Ok(Self {
            factory,
            registry,
            jobs,
        })
    }

    pub fn jobs(&self) -> &[CompositeOperation] {
        &self.jobs
    }

    pub fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    /// The simulated repository the plan runs against.
    pub fn repository(&self) -> &Arc<MemoryRepository> {
        self.factory.repository()
    }

    /// Runs every job, one after another or concurrently, and summarizes them.
    pub fn run(&mut self, progress: &dyn ProgressReporter, parallel: bool) -> Vec<RunSummary> {
        let states = if parallel {
            run_concurrently(&mut self.jobs, progress)
        } else {
            run_sequentially(&mut self.jobs, progress)
        };
        for (job, state) in self.jobs.iter().zip(&states) {
            info!("Job '{}' finished: {}", job.name(), state);
        }
        self.jobs.iter().map(CompositeOperation::summary).collect()
    }

    /// The worst state across all jobs: error, then cancelled, then ok.
    ///
    /// A failed job is never reported as cancelled, even when a later job
    /// observed cancellation.
    pub fn overall_state(&self) -> ExecutionState {
        let states: Vec<_> = self.jobs.iter().map(CompositeOperation::execution_state).collect();
        if states.contains(&ExecutionState::Error) {
            ExecutionState::Error
        } else if states.contains(&ExecutionState::Cancelled) {
            ExecutionState::Cancelled
        } else if states.iter().all(|s| *s == ExecutionState::Ok) {
            ExecutionState::Ok
        } else {
            ExecutionState::NotExecuted
        }
    }
}

/// Loads the plan's starting state into `repository`.
///
/// Location roots always exist; the simulation section adds folders, working
/// copies and injected failures.
pub fn seed(repository: &MemoryRepository, plan: &PlanConfig) {
    for location in &plan.locations {
        repository.add_remote(&location.url);
    }
    seed_simulation(repository, &plan.simulation);
}

fn seed_simulation(repository: &MemoryRepository, simulation: &SimulationConfig) {
    for remote in &simulation.remotes {
        repository.add_remote(remote);
    }
    for working_copy in &simulation.working_copies {
        repository.add_working_copy(working_copy.path.clone(), &working_copy.url);
        if working_copy.modified {
            repository.modify(working_copy.path.clone());
        }
    }
    for failure in &simulation.failures {
        debug!("Injecting {:?} failure into '{}'", failure.kind, failure.verb);
        repository.inject(failure.clone());
    }
}

fn build_job(
    job: &JobConfig,
    registry: &LocationRegistry,
    console: Arc<dyn ConsoleSink>,
) -> Result<CompositeOperation> {
    let mut composite = CompositeOperation::new(job.name.clone()).with_console(console);
    let mut handles: HashMap<&str, OperationHandle> = HashMap::new();
    for entry in &job.operations {
        let location = registry.get(entry.kind.location())?;
        let operation = Operation::from_boxed(build_action(&entry.kind, location)).with_id(&entry.id);
        let dependencies = entry
            .depends_on
            .iter()
            .map(|id| {
                handles.get(id.as_str()).copied().ok_or_else(|| Error::InvalidDependency {
                    operation: entry.id.clone(),
                    message: format!("'{}' is not an earlier operation of job '{}'", id, job.name),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let handle = composite.add_with_dependencies(operation, &dependencies)?;
        handles.insert(entry.id.as_str(), handle);
    }
    debug!("Job '{}': {} operation(s)", job.name, composite.len());
    Ok(composite)
}

fn working_copies(
    paths: &[std::path::PathBuf],
    location: &Arc<RepositoryLocation>,
) -> Vec<WorkingCopy> {
    paths
        .iter()
        .map(|path| WorkingCopy::new(path.clone(), location.clone()))
        .collect()
}

fn build_action(kind: &OperationKind, location: Arc<RepositoryLocation>) -> Box<dyn Action> {
    match kind {
        OperationKind::Mkdir(op) => Box::new(
            CreateFolderOperation::new(location, op.urls.clone(), &op.message)
                .make_parents(op.parents),
        ),
        OperationKind::Checkout(op) => Box::new(
            CheckoutOperation::new(location, op.url.clone(), op.path.clone())
                .revision(config::revision(op.revision))
                .depth(op.depth),
        ),
        OperationKind::Update(op) => Box::new(
            UpdateOperation::new(working_copies(&op.paths, &location))
                .revision(config::revision(op.revision))
                .depth(op.depth),
        ),
        OperationKind::Switch(op) => {
            let targets = op
                .targets
                .iter()
                .map(|target| SwitchTarget {
                    working_copy: WorkingCopy::new(target.path.clone(), location.clone()),
                    url: target.url.clone(),
                })
                .collect();
            Box::new(
                SwitchOperation::new(targets)
                    .revision(config::revision(op.revision))
                    .depth(op.depth),
            )
        }
        OperationKind::Commit(op) => Box::new(
            CommitOperation::new(working_copies(&op.paths, &location), &op.message)
                .depth(op.depth)
                .keep_locks(op.keep_locks),
        ),
        OperationKind::Cleanup(op) => {
            Box::new(CleanupOperation::new(working_copies(&op.paths, &location)))
        }
        OperationKind::Relocate(op) => {
            Box::new(RelocateOperation::new(location, op.paths.clone(), &op.to))
        }
        OperationKind::SetProperties(op) => {
            let properties: Vec<PropertyData> = op.properties.clone();
            Box::new(
                SetPropertiesOperation::new(working_copies(&op.paths, &location), properties)
                    .depth(op.depth),
            )
        }
        OperationKind::RemoveProperties(op) => Box::new(
            RemovePropertiesOperation::new(working_copies(&op.paths, &location), op.names.clone())
                .depth(op.depth),
        ),
        OperationKind::Lock(op) => Box::new(
            LockOperation::new(working_copies(&op.paths, &location), &op.comment).force(op.force),
        ),
        OperationKind::Unlock(op) => {
            Box::new(UnlockOperation::new(working_copies(&op.paths, &location)).force(op.force))
        }
        OperationKind::Revert(op) => Box::new(
            RevertOperation::new(working_copies(&op.paths, &location)).depth(op.depth),
        ),
    }
}
