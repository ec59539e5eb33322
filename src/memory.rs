//! # In-Memory Native Connector
//!
//! `MemoryConnector` implements every [`NativeConnector`] verb over a shared
//! [`MemoryRepository`]: a set of remote paths, the working copies checked out
//! from them, versioned properties, locks and a head revision. It is used by
//! the `svn-ops run` command to execute plans without a native client, and by
//! the tests.
//!
//! ## Failure Injection
//!
//! A [`FailureRule`] makes a verb fail, optionally only for one target. The
//! failure can be an ordinary connector error, a network error, a cancellation
//! reported by the native call, or a panic (to exercise fatal containment).
//! The pseudo-verb `connect` makes the factory fail to create proxies.
//!
//! Every call is recorded as a [`CallRecord`] together with the call tag that
//! was active, so tests can check ordering and attribution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::call_context::current_call_id;
use crate::connector::{ConnectorFactory, Depth, NativeConnector, PropertyData, Revision};
use crate::error::{Error, Result};
use crate::location::LocationSettings;

/// How an injected failure manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[default]
    Error,
    Network,
    Cancel,
    Panic,
}

/// Makes `verb` fail, for every target or only for `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRule {
    pub verb: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub kind: FailureKind,
    #[serde(default)]
    pub message: Option<String>,
    /// Number of times the rule fires before it is exhausted. Unlimited if unset.
    #[serde(default)]
    pub times: Option<u32>,
}

impl FailureRule {
    pub fn new(verb: &str, target: Option<&str>, kind: FailureKind) -> Self {
        Self {
            verb: verb.to_string(),
            target: target.map(str::to_string),
            kind,
            message: None,
            times: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    #[must_use]
    pub fn times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }

    fn matches(&self, verb: &str, target: &str) -> bool {
        self.verb == verb
            && self.times != Some(0)
            && self.target.as_deref().is_none_or(|t| t == target)
    }

    fn to_error(&self, verb: &str, target: &str) -> Error {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "injected failure".to_string());
        match self.kind {
            FailureKind::Error | FailureKind::Panic => Error::connector(verb, target, message),
            FailureKind::Network => Error::Network {
                url: target.to_string(),
                message,
            },
            FailureKind::Cancel => Error::cancelled(format!("svn {} {}", verb, target)),
        }
    }
}

/// One recorded native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub verb: String,
    pub target: String,
    /// Diagnostic tag active while the call ran.
    pub call_id: Option<String>,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct RepositoryState {
    head: u64,
    remote: BTreeSet<String>,
    working_copies: BTreeMap<PathBuf, String>,
    properties: HashMap<(String, String), String>,
    locks: BTreeSet<PathBuf>,
    dirty: BTreeSet<PathBuf>,
    failures: Vec<FailureRule>,
    calls: Vec<CallRecord>,
    disposed: u64,
}

/// The shared state behind every `MemoryConnector` of one factory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<RepositoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing remote path (typically a repository root).
    pub fn add_remote(&self, url: &str) {
        self.lock().remote.insert(normalize_url(url));
    }

    pub fn has_remote(&self, url: &str) -> bool {
        self.lock().remote.contains(&normalize_url(url))
    }

    /// Registers an existing working copy of `url`.
    pub fn add_working_copy(&self, path: impl Into<PathBuf>, url: &str) {
        self.lock()
            .working_copies
            .insert(path.into(), normalize_url(url));
    }

    /// Returns the URL a working copy points at.
    pub fn working_copy_url(&self, path: &Path) -> Option<String> {
        self.lock().working_copies.get(path).cloned()
    }

    /// Marks a working copy as having local modifications.
    pub fn modify(&self, path: impl Into<PathBuf>) {
        self.lock().dirty.insert(path.into());
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.lock().locks.contains(path)
    }

    pub fn property(&self, target: &str, name: &str) -> Option<String> {
        self.lock()
            .properties
            .get(&(target.to_string(), name.to_string()))
            .cloned()
    }

    pub fn head(&self) -> u64 {
        self.lock().head
    }

    pub fn inject(&self, rule: FailureRule) {
        self.lock().failures.push(rule);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    /// Returns the recorded calls for one verb.
    pub fn calls_for(&self, verb: &str) -> Vec<CallRecord> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.verb == verb)
            .cloned()
            .collect()
    }

    pub fn disposed_proxies(&self) -> u64 {
        self.lock().disposed
    }

    // A panicking injected failure poisons nothing: the panic is raised
    // after the guard is released.
    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and applies the matching failure rule, if any.
    fn enter(&self, verb: &str, target: &str) -> Result<MutexGuard<'_, RepositoryState>> {
        let mut state = self.lock();
        let call_id = current_call_id();
        let rule = state
            .failures
            .iter_mut()
            .find(|rule| rule.matches(verb, target))
            .map(|rule| {
                if let Some(times) = rule.times.as_mut() {
                    *times -= 1;
                }
                rule.clone()
            });
        state.calls.push(CallRecord {
            verb: verb.to_string(),
            target: target.to_string(),
            call_id,
            succeeded: rule.is_none(),
        });
        match rule {
            None => Ok(state),
            Some(rule) if rule.kind == FailureKind::Panic => {
                drop(state);
                panic!("injected panic in svn {} {}", verb, target);
            }
            Some(rule) => {
                debug!("Injected {:?} failure for svn {} {}", rule.kind, verb, target);
                Err(rule.to_error(verb, target))
            }
        }
    }
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn parent_url(url: &str) -> Option<&str> {
    let (parent, name) = url.rsplit_once('/')?;
    if name.is_empty() || parent.ends_with('/') {
        None
    } else {
        Some(parent)
    }
}

fn require_working_copy(state: &RepositoryState, verb: &str, path: &Path) -> Result<String> {
    state
        .working_copies
        .get(path)
        .cloned()
        .ok_or_else(|| Error::connector(verb, path.display().to_string(), "not a working copy"))
}

fn joined(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A native proxy over a [`MemoryRepository`].
#[derive(Debug)]
pub struct MemoryConnector {
    repository: Arc<MemoryRepository>,
    disposed: AtomicBool,
}

impl MemoryConnector {
    pub fn new(repository: Arc<MemoryRepository>) -> Self {
        Self {
            repository,
            disposed: AtomicBool::new(false),
        }
    }

    fn enter(&self, verb: &str, target: &str) -> Result<MutexGuard<'_, RepositoryState>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::internal(format!(
                "svn {} called on a disposed proxy",
                verb
            )));
        }
        self.repository.enter(verb, target)
    }
}

impl NativeConnector for MemoryConnector {
    fn checkout(&self, url: &str, path: &Path, _revision: Revision, _depth: Depth) -> Result<u64> {
        let mut state = self.enter("checkout", url)?;
        let url = normalize_url(url);
        if !state.remote.contains(&url) {
            return Err(Error::connector("checkout", url, "path not found"));
        }
        if state.working_copies.contains_key(path) {
            return Err(Error::connector(
                "checkout",
                path.display().to_string(),
                "destination is already a working copy",
            ));
        }
        state.working_copies.insert(path.to_path_buf(), url);
        Ok(state.head)
    }

    fn update(&self, paths: &[PathBuf], _revision: Revision, _depth: Depth) -> Result<u64> {
        let state = self.enter("update", &joined(paths))?;
        for path in paths {
            require_working_copy(&state, "update", path)?;
        }
        Ok(state.head)
    }

    fn switch(&self, path: &Path, url: &str, _revision: Revision, _depth: Depth) -> Result<u64> {
        let mut state = self.enter("switch", &path.display().to_string())?;
        require_working_copy(&state, "switch", path)?;
        let url = normalize_url(url);
        if !state.remote.contains(&url) {
            return Err(Error::connector("switch", url, "path not found"));
        }
        state.working_copies.insert(path.to_path_buf(), url);
        Ok(state.head)
    }

    fn commit(&self, paths: &[PathBuf], _message: &str, _depth: Depth) -> Result<Option<u64>> {
        let mut state = self.enter("commit", &joined(paths))?;
        for path in paths {
            require_working_copy(&state, "commit", path)?;
        }
        let changed = paths.iter().filter(|p| state.dirty.contains(*p)).count();
        if changed == 0 {
            return Ok(None);
        }
        for path in paths {
            state.dirty.remove(path);
        }
        state.head += 1;
        Ok(Some(state.head))
    }

    fn mkdir(&self, urls: &[String], _message: &str, make_parents: bool) -> Result<u64> {
        let mut state = self.enter("mkdir", &urls.join(" "))?;
        let mut created = Vec::new();
        for url in urls {
            let url = normalize_url(url);
            if state.remote.contains(&url) {
                return Err(Error::connector("mkdir", url, "path already exists"));
            }
            let mut missing = Vec::new();
            let mut cursor = parent_url(&url);
            while let Some(parent) = cursor {
                if state.remote.contains(parent) || created.iter().any(|c: &String| c == parent) {
                    break;
                }
                missing.push(parent.to_string());
                cursor = parent_url(parent);
            }
            if cursor.is_none() || (!missing.is_empty() && !make_parents) {
                return Err(Error::connector("mkdir", url, "parent path not found"));
            }
            created.extend(missing);
            created.push(url);
        }
        state.remote.extend(created);
        state.head += 1;
        Ok(state.head)
    }

    fn relocate(&self, from: &str, to: &str, path: &Path) -> Result<()> {
        let mut state = self.enter("relocate", &path.display().to_string())?;
        let current = require_working_copy(&state, "relocate", path)?;
        let from = normalize_url(from);
        let Some(rest) = current.strip_prefix(&from) else {
            return Err(Error::connector(
                "relocate",
                path.display().to_string(),
                format!("working copy is not under {}", from),
            ));
        };
        let relocated = format!("{}{}", normalize_url(to), rest);
        state.working_copies.insert(path.to_path_buf(), relocated);
        Ok(())
    }

    fn cleanup(&self, path: &Path) -> Result<()> {
        let state = self.enter("cleanup", &path.display().to_string())?;
        require_working_copy(&state, "cleanup", path)?;
        Ok(())
    }

    fn get_property(&self, target: &str, name: &str) -> Result<Option<String>> {
        let state = self.enter("propget", target)?;
        Ok(state
            .properties
            .get(&(target.to_string(), name.to_string()))
            .cloned())
    }

    fn set_property(&self, target: &str, property: &PropertyData, _depth: Depth) -> Result<()> {
        let mut state = self.enter("propset", target)?;
        require_working_copy(&state, "propset", Path::new(target))?;
        state.properties.insert(
            (target.to_string(), property.name.clone()),
            property.value.clone(),
        );
        state.dirty.insert(PathBuf::from(target));
        Ok(())
    }

    fn remove_property(&self, target: &str, name: &str, _depth: Depth) -> Result<()> {
        let mut state = self.enter("propdel", target)?;
        require_working_copy(&state, "propdel", Path::new(target))?;
        if state
            .properties
            .remove(&(target.to_string(), name.to_string()))
            .is_some()
        {
            state.dirty.insert(PathBuf::from(target));
        }
        Ok(())
    }

    fn lock(&self, paths: &[PathBuf], _comment: &str, force: bool) -> Result<()> {
        let mut state = self.enter("lock", &joined(paths))?;
        for path in paths {
            require_working_copy(&state, "lock", path)?;
            if state.locks.contains(path) && !force {
                return Err(Error::connector(
                    "lock",
                    path.display().to_string(),
                    "already locked",
                ));
            }
        }
        state.locks.extend(paths.iter().cloned());
        Ok(())
    }

    fn unlock(&self, paths: &[PathBuf], force: bool) -> Result<()> {
        let mut state = self.enter("unlock", &joined(paths))?;
        for path in paths {
            if !state.locks.contains(path) && !force {
                return Err(Error::connector(
                    "unlock",
                    path.display().to_string(),
                    "not locked",
                ));
            }
        }
        for path in paths {
            state.locks.remove(path);
        }
        Ok(())
    }

    fn revert(&self, paths: &[PathBuf], _depth: Depth) -> Result<()> {
        let mut state = self.enter("revert", &joined(paths))?;
        for path in paths {
            require_working_copy(&state, "revert", path)?;
        }
        for path in paths {
            state.dirty.remove(path);
        }
        Ok(())
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.repository.lock().disposed += 1;
        }
    }
}

/// Creates [`MemoryConnector`]s sharing one [`MemoryRepository`].
#[derive(Debug, Default)]
pub struct MemoryConnectorFactory {
    repository: Arc<MemoryRepository>,
    created: AtomicU64,
    usernames: Mutex<Vec<Option<String>>>,
}

impl MemoryConnectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory over an existing repository.
    pub fn with_repository(repository: Arc<MemoryRepository>) -> Self {
        Self {
            repository,
            ..Self::default()
        }
    }

    pub fn repository(&self) -> &Arc<MemoryRepository> {
        &self.repository
    }

    /// Number of proxies created so far.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of proxies created with `username` in their settings.
    pub fn created_with_username(&self, username: &str) -> usize {
        self.usernames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|name| name.as_deref() == Some(username))
            .count()
    }
}

impl ConnectorFactory for MemoryConnectorFactory {
    fn create(&self, settings: &LocationSettings) -> Result<Box<dyn NativeConnector>> {
        drop(self.repository.enter("connect", &settings.url)?);
        self.created.fetch_add(1, Ordering::SeqCst);
        self.usernames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(settings.username.clone());
        Ok(Box::new(MemoryConnector::new(self.repository.clone())))
    }
}
