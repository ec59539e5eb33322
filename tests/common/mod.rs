//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then `use common::prelude::*;`.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! #[cfg_attr(not(feature = "integration-tests"), ignore)]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_plan(plans::LAYOUT);
//!     fixture.command().arg("run").assert().success();
//! }
//! ```

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::path::Path;
use std::sync::Arc;

use svn_ops::console::{ConsoleLevel, ConsoleSink};
use svn_ops::location::{LocationSettings, RepositoryLocation};
use svn_ops::memory::MemoryConnectorFactory;
use svn_ops::progress::CancellationFlag;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::plans;
    #[allow(unused_imports)]
    pub use super::TestFixture;
}

/// Plan files used across the E2E tests.
pub mod plans {
    /// One job that creates a folder, checks it out and sets a property.
    pub const LAYOUT: &str = r#"
locations:
  - id: main
    url: svn://host/repo
    username: builder
jobs:
  - name: layout
    operations:
      - id: trunk
        mkdir:
          location: main
          urls: [svn://host/repo/trunk]
          message: create trunk
      - id: checkout
        depends_on: [trunk]
        checkout:
          location: main
          url: svn://host/repo/trunk
          path: /wc/trunk
      - id: ignore
        depends_on: [checkout]
        set_properties:
          location: main
          paths: [/wc/trunk]
          properties:
            - name: svn:ignore
              value: target
"#;

    /// A commit that hits an injected network failure and an unlock gated on it.
    pub const FAILING_COMMIT: &str = r#"
locations:
  - id: main
    url: svn://host/repo
jobs:
  - name: release
    operations:
      - id: commit
        commit:
          location: main
          paths: [/wc/a]
          message: release
      - id: unlock
        depends_on: [commit]
        unlock:
          location: main
          paths: [/wc/a]
      - id: tidy
        cleanup:
          location: main
          paths: [/wc/a]
simulation:
  working_copies:
    - path: /wc/a
      url: svn://host/repo
      modified: true
  failures:
    - verb: commit
      kind: network
      message: connection reset
"#;

    /// Two independent jobs on one location.
    pub const TWO_JOBS: &str = r#"
locations:
  - id: main
    url: svn://host/repo
jobs:
  - name: first
    operations:
      - id: tidy
        cleanup: { location: main, paths: [/wc/a] }
  - name: second
    operations:
      - id: refresh
        update: { location: main, paths: [/wc/b] }
simulation:
  working_copies:
    - { path: /wc/a, url: svn://host/repo }
    - { path: /wc/b, url: svn://host/repo }
"#;

    /// Depends on an operation declared later in the job.
    pub const FORWARD_DEPENDENCY: &str = r#"
locations:
  - id: main
    url: svn://host/repo
jobs:
  - name: broken
    operations:
      - id: first
        depends_on: [second]
        cleanup: { location: main, paths: [/wc/a] }
      - id: second
        cleanup: { location: main, paths: [/wc/b] }
"#;

    /// Not YAML at all.
    pub const INVALID_YAML: &str = "jobs: [unclosed";
}

/// A temporary directory holding an optional `.svn-ops.yaml`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Writes `.svn-ops.yaml` with the given content.
    pub fn with_plan(self, content: &str) -> Self {
        self.temp_dir
            .child(".svn-ops.yaml")
            .write_str(content)
            .expect("Failed to write plan file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn plan_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join(".svn-ops.yaml")
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A command for the `svn-ops` binary running in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("svn-ops");
        cmd.current_dir(self.path())
            .env_remove("SVN_OPS_PLAN")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A location over a fresh in-memory repository whose root exists.
pub fn memory_location(
    id: &str,
    url: &str,
) -> (Arc<MemoryConnectorFactory>, Arc<RepositoryLocation>) {
    let factory = Arc::new(MemoryConnectorFactory::new());
    factory.repository().add_remote(url);
    let location = RepositoryLocation::new(id, LocationSettings::new(url), factory.clone())
        .expect("valid location settings");
    (factory, Arc::new(location))
}

/// Requests cancellation when the first operation it echoes for has ended.
pub struct CancelAfterFirstOperation {
    flag: CancellationFlag,
}

impl CancelAfterFirstOperation {
    pub fn new(flag: CancellationFlag) -> Self {
        Self { flag }
    }
}

impl ConsoleSink for CancelAfterFirstOperation {
    fn write(&self, _level: ConsoleLevel, _text: &str) {}

    fn mark_end(&self) {
        self.flag.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_plan() {
        let fixture = TestFixture::new().with_plan(plans::LAYOUT);
        assert!(fixture.plan_path().exists());
    }

    #[test]
    fn test_valid_plans_parse() {
        for plan in [plans::LAYOUT, plans::FAILING_COMMIT, plans::TWO_JOBS] {
            svn_ops::config::parse(plan).expect("plan should be valid");
        }
    }

    #[test]
    fn test_invalid_plans_are_rejected() {
        assert!(svn_ops::config::parse(plans::FORWARD_DEPENDENCY).is_err());
        assert!(svn_ops::config::parse(plans::INVALID_YAML).is_err());
    }
}
