//! # Native Client Boundary
//!
//! The framework never speaks a repository protocol itself. It drives a
//! [`NativeConnector`], an opaque capability surface offering version-control
//! verbs, and only distinguishes success from a classified [`Error`]. Proxies
//! are created by a [`ConnectorFactory`] from a location's settings and are
//! leased through [`RepositoryLocation`](crate::location::RepositoryLocation).
//!
//! [`TaggedConnector`] wraps a proxy so that each verb runs inside a
//! [`CallTag`], attributing native diagnostics to the right caller.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::call_context::CallTag;
use crate::error::Result;
use crate::location::LocationSettings;

/// A revision selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    #[default]
    Head,
    Number(u64),
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Head => f.write_str("HEAD"),
            Revision::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Recursion depth of a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Empty,
    Files,
    Immediates,
    #[default]
    Infinity,
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Depth::Empty => "empty",
            Depth::Files => "files",
            Depth::Immediates => "immediates",
            Depth::Infinity => "infinity",
        };
        f.write_str(label)
    }
}

/// A versioned property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyData {
    pub name: String,
    pub value: String,
}

impl PropertyData {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The verbs the framework invokes on a native client.
///
/// Implementations must be usable through `&self` from whichever thread
/// currently holds the lease. Failures are reported as classified errors;
/// a call that observed user cancellation returns
/// [`Error::Cancelled`](crate::error::Error::Cancelled).
pub trait NativeConnector: Send + Sync {
    /// Checks out `url` into `path`, returning the checked-out revision.
    fn checkout(&self, url: &str, path: &Path, revision: Revision, depth: Depth) -> Result<u64>;

    /// Updates working copies, returning the revision they were updated to.
    fn update(&self, paths: &[PathBuf], revision: Revision, depth: Depth) -> Result<u64>;

    /// Switches a working copy to another URL.
    fn switch(&self, path: &Path, url: &str, revision: Revision, depth: Depth) -> Result<u64>;

    /// Commits working copy changes. `None` means there was nothing to commit.
    fn commit(&self, paths: &[PathBuf], message: &str, depth: Depth) -> Result<Option<u64>>;

    /// Creates remote folders, returning the new revision.
    fn mkdir(&self, urls: &[String], message: &str, make_parents: bool) -> Result<u64>;

    /// Rewrites the repository root of a working copy.
    fn relocate(&self, from: &str, to: &str, path: &Path) -> Result<()>;

    /// Recovers a working copy from interrupted operations.
    fn cleanup(&self, path: &Path) -> Result<()>;

    fn get_property(&self, target: &str, name: &str) -> Result<Option<String>>;

    fn set_property(&self, target: &str, property: &PropertyData, depth: Depth) -> Result<()>;

    fn remove_property(&self, target: &str, name: &str, depth: Depth) -> Result<()>;

    fn lock(&self, paths: &[PathBuf], comment: &str, force: bool) -> Result<()>;

    fn unlock(&self, paths: &[PathBuf], force: bool) -> Result<()>;

    fn revert(&self, paths: &[PathBuf], depth: Depth) -> Result<()>;

    /// Releases native resources. Errors are swallowed by the caller.
    fn dispose(&self);
}

/// Creates native proxies for a location.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, settings: &LocationSettings) -> Result<Box<dyn NativeConnector>>;
}

/// Runs every verb of the wrapped proxy inside a [`CallTag`].
pub struct TaggedConnector {
    inner: Box<dyn NativeConnector>,
}

impl TaggedConnector {
    pub fn new(inner: Box<dyn NativeConnector>) -> Self {
        Self { inner }
    }
}

impl NativeConnector for TaggedConnector {
    fn checkout(&self, url: &str, path: &Path, revision: Revision, depth: Depth) -> Result<u64> {
        let _tag = CallTag::enter("checkout");
        self.inner.checkout(url, path, revision, depth)
    }

    fn update(&self, paths: &[PathBuf], revision: Revision, depth: Depth) -> Result<u64> {
        let _tag = CallTag::enter("update");
        self.inner.update(paths, revision, depth)
    }

    fn switch(&self, path: &Path, url: &str, revision: Revision, depth: Depth) -> Result<u64> {
        let _tag = CallTag::enter("switch");
        self.inner.switch(path, url, revision, depth)
    }

    fn commit(&self, paths: &[PathBuf], message: &str, depth: Depth) -> Result<Option<u64>> {
        let _tag = CallTag::enter("commit");
        self.inner.commit(paths, message, depth)
    }

    fn mkdir(&self, urls: &[String], message: &str, make_parents: bool) -> Result<u64> {
        let _tag = CallTag::enter("mkdir");
        self.inner.mkdir(urls, message, make_parents)
    }

    fn relocate(&self, from: &str, to: &str, path: &Path) -> Result<()> {
        let _tag = CallTag::enter("relocate");
        self.inner.relocate(from, to, path)
    }

    fn cleanup(&self, path: &Path) -> Result<()> {
        let _tag = CallTag::enter("cleanup");
        self.inner.cleanup(path)
    }

    fn get_property(&self, target: &str, name: &str) -> Result<Option<String>> {
        let _tag = CallTag::enter("propget");
        self.inner.get_property(target, name)
    }

    fn set_property(&self, target: &str, property: &PropertyData, depth: Depth) -> Result<()> {
        let _tag = CallTag::enter("propset");
        self.inner.set_property(target, property, depth)
    }

    fn remove_property(&self, target: &str, name: &str, depth: Depth) -> Result<()> {
        let _tag = CallTag::enter("propdel");
        self.inner.remove_property(target, name, depth)
    }

    fn lock(&self, paths: &[PathBuf], comment: &str, force: bool) -> Result<()> {
        let _tag = CallTag::enter("lock");
        self.inner.lock(paths, comment, force)
    }

    fn unlock(&self, paths: &[PathBuf], force: bool) -> Result<()> {
        let _tag = CallTag::enter("unlock");
        self.inner.unlock(paths, force)
    }

    fn revert(&self, paths: &[PathBuf], depth: Depth) -> Result<()> {
        let _tag = CallTag::enter("revert");
        self.inner.revert(paths, depth)
    }

    fn dispose(&self) {
        let _tag = CallTag::enter("dispose");
        self.inner.dispose()
    }
}
