//! # Plan Schema and Parsing
//!
//! This module defines the data structures that represent a `.svn-ops.yaml`
//! plan file and the logic for parsing and validating it.
//!
//! ## Key Components
//!
//! - **`PlanConfig`**: The whole file: settings, repository locations, jobs
//!   and an optional simulation section.
//!
//! - **`JobConfig`**: One named job, run as a single composite operation.
//!
//! - **`OperationConfig`**: One operation of a job: its `id`, the ids of
//!   earlier operations it depends on, and exactly one operation kind.
//!
//! - **`OperationKind`**: An enum with one variant per concrete operation;
//!   each variant carries a struct holding that operation's parameters.
//!
//! ## Example
//!
//! ```yaml
//! locations:
//!   - id: main
//!     url: svn://example.com/repo
//! jobs:
//!   - name: layout
//!     operations:
//!       - id: trunk
//!         mkdir:
//!           location: main
//!           urls: [svn://example.com/repo/trunk]
//!           message: create trunk
//!       - id: checkout
//!         depends_on: [trunk]
//!         checkout:
//!           location: main
//!           url: svn://example.com/repo/trunk
//!           path: /work/trunk
//! ```
//!
//! ## Validation
//!
//! `parse` rejects plans that could not be built: duplicate ids, references
//! to unknown locations, `depends_on` entries that do not name an earlier
//! operation of the same job, invalid URLs and empty jobs. Every rejection
//! is an [`Error::ConfigParse`] carrying a hint for how to fix it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::connector::{Depth, PropertyData, Revision};
use crate::error::{Error, Result};
use crate::location::{LocationSettings, SshSettings, SslSettings, DEFAULT_PROXY_CACHE_SIZE};
use crate::memory::FailureRule;

/// Default plan file name, looked up in the current directory.
pub const DEFAULT_PLAN_FILE: &str = ".svn-ops.yaml";

/// The complete plan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    /// Initial state of the in-memory repository the plan runs against.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Idle proxies kept warm per location.
    pub proxy_cache_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_cache_size: DEFAULT_PROXY_CACHE_SIZE,
        }
    }
}

/// A repository location and its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub id: String,
    /// Repository root URL.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl: SslSettings,
    #[serde(default)]
    pub ssh: SshSettings,
}

impl LocationConfig {
    pub fn settings(&self) -> LocationSettings {
        LocationSettings {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ssl: self.ssl.clone(),
            ssh: self.ssh.clone(),
        }
    }
}

/// A named job: a sequence of operations run as one composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

/// One operation of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    pub id: String,
    /// Ids of earlier operations of the same job that must end `ok` first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub kind: OperationKind,
}

/// All operation kinds a plan can declare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// `svn mkdir`
    Mkdir(MkdirOp),
    /// `svn checkout`
    Checkout(CheckoutOp),
    /// `svn update`
    Update(UpdateOp),
    /// `svn switch`
    Switch(SwitchOp),
    /// `svn commit`
    Commit(CommitOp),
    /// `svn cleanup`
    Cleanup(PathsOp),
    /// `svn relocate`
    Relocate(RelocateOp),
    /// `svn propset`
    SetProperties(SetPropertiesOp),
    /// `svn propdel`
    RemoveProperties(RemovePropertiesOp),
    /// `svn lock`
    Lock(LockOp),
    /// `svn unlock`
    Unlock(UnlockOp),
    /// `svn revert`
    Revert(RevertOp),
}

impl OperationKind {
    /// The YAML key of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Mkdir(_) => "mkdir",
            OperationKind::Checkout(_) => "checkout",
            OperationKind::Update(_) => "update",
            OperationKind::Switch(_) => "switch",
            OperationKind::Commit(_) => "commit",
            OperationKind::Cleanup(_) => "cleanup",
            OperationKind::Relocate(_) => "relocate",
            OperationKind::SetProperties(_) => "set_properties",
            OperationKind::RemoveProperties(_) => "remove_properties",
            OperationKind::Lock(_) => "lock",
            OperationKind::Unlock(_) => "unlock",
            OperationKind::Revert(_) => "revert",
        }
    }

    /// Id of the location this operation runs against.
    pub fn location(&self) -> &str {
        match self {
            OperationKind::Mkdir(op) => &op.location,
            OperationKind::Checkout(op) => &op.location,
            OperationKind::Update(op) => &op.location,
            OperationKind::Switch(op) => &op.location,
            OperationKind::Commit(op) => &op.location,
            OperationKind::Cleanup(op) => &op.location,
            OperationKind::Relocate(op) => &op.location,
            OperationKind::SetProperties(op) => &op.location,
            OperationKind::RemoveProperties(op) => &op.location,
            OperationKind::Lock(op) => &op.location,
            OperationKind::Unlock(op) => &op.location,
            OperationKind::Revert(op) => &op.location,
        }
    }

    /// URLs the operation names explicitly, checked at parse time.
    fn urls(&self) -> Vec<&str> {
        match self {
            OperationKind::Mkdir(op) => op.urls.iter().map(String::as_str).collect(),
            OperationKind::Checkout(op) => vec![op.url.as_str()],
            OperationKind::Switch(op) => op.targets.iter().map(|t| t.url.as_str()).collect(),
            OperationKind::Relocate(op) => vec![op.to.as_str()],
            _ => Vec::new(),
        }
    }
}

/// Parameters of `mkdir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirOp {
    pub location: String,
    pub urls: Vec<String>,
    pub message: String,
    /// Create intermediate folders.
    #[serde(default)]
    pub parents: bool,
}

/// Parameters of `checkout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOp {
    pub location: String,
    pub url: String,
    pub path: PathBuf,
    /// Revision number; HEAD if omitted.
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub depth: Depth,
}

/// Working copies of one location, with no further parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
}

/// Parameters of `update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub depth: Depth,
}

/// One working copy of a `switch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchTargetConfig {
    pub path: PathBuf,
    pub url: String,
}

/// Parameters of `switch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchOp {
    pub location: String,
    pub targets: Vec<SwitchTargetConfig>,
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub depth: Depth,
}

/// Parameters of `commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    pub message: String,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub keep_locks: bool,
}

/// Parameters of `relocate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocateOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    /// New repository root URL.
    pub to: String,
}

/// Parameters of `set_properties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPropertiesOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    pub properties: Vec<PropertyData>,
    #[serde(default = "default_property_depth")]
    pub depth: Depth,
}

/// Parameters of `remove_properties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovePropertiesOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    pub names: Vec<String>,
    #[serde(default = "default_property_depth")]
    pub depth: Depth,
}

/// Parameters of `lock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub force: bool,
}

/// Parameters of `unlock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub force: bool,
}

/// Parameters of `revert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertOp {
    pub location: String,
    pub paths: Vec<PathBuf>,
    #[serde(default = "default_property_depth")]
    pub depth: Depth,
}

/// Property edits and reverts touch only the named targets unless asked.
pub fn default_property_depth() -> Depth {
    Depth::Empty
}

/// Converts an optional plan revision into a revision selector.
pub fn revision(number: Option<u64>) -> Revision {
    number.map_or(Revision::Head, Revision::Number)
}

/// A working copy known to the simulated repository before the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedWorkingCopy {
    pub path: PathBuf,
    pub url: String,
    /// Has local changes, so a commit produces a revision.
    #[serde(default)]
    pub modified: bool,
}

/// Initial state of the in-memory repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Remote folders that already exist.
    pub remotes: Vec<String>,
    pub working_copies: Vec<SimulatedWorkingCopy>,
    /// Failures injected into native calls.
    pub failures: Vec<FailureRule>,
}

impl PlanConfig {
    /// Total number of operations across every job.
    pub fn operation_count(&self) -> usize {
        self.jobs.iter().map(|job| job.operations.len()).sum()
    }

    pub fn location(&self, id: &str) -> Option<&LocationConfig> {
        self.locations.iter().find(|location| location.id == id)
    }

    /// Checks everything the plan builder relies on.
    pub fn validate(&self) -> Result<()> {
        let mut location_ids = HashSet::new();
        for location in &self.locations {
            if !location_ids.insert(location.id.as_str()) {
                return Err(config_error(
                    format!("duplicate location id '{}'", location.id),
                    "every entry under `locations` needs a distinct `id`",
                ));
            }
            check_url(&location.url, &format!("location '{}'", location.id))?;
        }

        let mut job_names = HashSet::new();
        for job in &self.jobs {
            if !job_names.insert(job.name.as_str()) {
                return Err(config_error(
                    format!("duplicate job name '{}'", job.name),
                    "give every job a distinct `name`",
                ));
            }
            if job.operations.is_empty() {
                return Err(config_error(
                    format!("job '{}' has no operations", job.name),
                    "add at least one entry under `operations`, or remove the job",
                ));
            }
            validate_job(job, &location_ids)?;
        }
        Ok(())
    }
}

fn validate_job(job: &JobConfig, location_ids: &HashSet<&str>) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for operation in &job.operations {
        let context = format!("operation '{}' of job '{}'", operation.id, job.name);
        if seen.contains(operation.id.as_str()) {
            return Err(config_error(
                format!("duplicate operation id '{}' in job '{}'", operation.id, job.name),
                "operation ids must be unique within a job",
            ));
        }
        for dependency in &operation.depends_on {
            if !seen.contains(dependency.as_str()) {
                let hint = if job.operations.iter().any(|op| &op.id == dependency) {
                    format!(
                        "'{}' is declared later in the job; move it before '{}'",
                        dependency, operation.id
                    )
                } else {
                    "`depends_on` may only name earlier operations of the same job".to_string()
                };
                return Err(config_error(
                    format!("{} depends on unknown operation '{}'", context, dependency),
                    hint,
                ));
            }
        }
        let location = operation.kind.location();
        if !location_ids.contains(location) {
            return Err(config_error(
                format!("{} uses unknown location '{}'", context, location),
                "declare the location under `locations` first",
            ));
        }
        for url in operation.kind.urls() {
            check_url(url, &context)?;
        }
        seen.insert(operation.id.as_str());
    }
    Ok(())
}

fn check_url(url: &str, context: &str) -> Result<()> {
    url::Url::parse(url).map(|_| ()).map_err(|e| {
        config_error(
            format!("invalid URL '{}' in {}: {}", url, context, e),
            "URLs must be absolute, e.g. svn://host/repo or https://host/svn/repo",
        )
    })
}

fn config_error(message: impl Into<String>, hint: impl Into<String>) -> Error {
    Error::ConfigParse {
        message: message.into(),
        hint: Some(hint.into()),
    }
}

/// Parses and validates a plan from a YAML string.
pub fn parse(yaml_content: &str) -> Result<PlanConfig> {
    let plan: PlanConfig = serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: Some(
            "each operation needs an `id` and exactly one kind such as `mkdir:` or `commit:`"
                .to_string(),
        ),
    })?;
    plan.validate()?;
    Ok(plan)
}

/// Parses and validates a plan file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PlanConfig> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}
