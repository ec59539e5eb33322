//! Operations on local working copies.

use std::path::PathBuf;
use std::sync::Arc;

use log::debug;

use crate::connector::{Depth, Revision};
use crate::console::{CommandLine, ConsoleLevel};
use crate::error::Result;
use crate::location::RepositoryLocation;
use crate::messages;
use crate::operation::{Action, OperationScope};
use crate::status::ErrorContainer;

use super::{display_all, failed_in_groups, group_by_location, path_label, WorkingCopy};

/// `svn update`, one native call per location.
pub struct UpdateOperation {
    working_copies: Vec<WorkingCopy>,
    revision: Revision,
    depth: Depth,
    updated_to: Vec<(String, u64)>,
}

impl UpdateOperation {
    pub fn new(working_copies: Vec<WorkingCopy>) -> Self {
        Self {
            working_copies,
            revision: Revision::Head,
            depth: Depth::Infinity,
            updated_to: Vec::new(),
        }
    }

    #[must_use]
    pub fn revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    /// Revision each location was updated to by the last run.
    pub fn updated_to(&self) -> &[(String, u64)] {
        &self.updated_to
    }
}

impl Action for UpdateOperation {
    fn message_key(&self) -> &str {
        messages::UPDATE
    }

    fn resources(&self) -> Vec<String> {
        display_all(&self.working_copies)
    }

    fn failed_resources(&self, errors: &[ErrorContainer]) -> Vec<String> {
        failed_in_groups(&self.working_copies, errors)
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        self.updated_to.clear();
        let groups = group_by_location(&self.working_copies);
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            groups.len() as u64,
        );
        let console = scope.console();
        let (revision, depth) = (self.revision, self.depth);
        for group in &groups {
            let paths = group.display_paths();
            let updated_to = &mut self.updated_to;
            scope.protect_resource_step(group.resource(), 1, |progress| {
                progress.set_task_label(&paths.join(" "));
                CommandLine::new("update")
                    .paths(&paths)
                    .revision(revision)
                    .depth(depth)
                    .username(group.location.username()?.as_deref())
                    .echo(console);
                let proxy = group.location.acquire()?;
                let updated = proxy.update(&group.paths, revision, depth)?;
                updated_to.push((group.resource().to_string(), updated));
                Ok(())
            });
        }
        Ok(())
    }
}

/// A working copy and the URL it should be switched to.
#[derive(Debug, Clone)]
pub struct SwitchTarget {
    pub working_copy: WorkingCopy,
    pub url: String,
}

/// `svn switch`, one protected step per working copy.
pub struct SwitchOperation {
    targets: Vec<SwitchTarget>,
    revision: Revision,
    depth: Depth,
}

impl SwitchOperation {
    pub fn new(targets: Vec<SwitchTarget>) -> Self {
        Self {
            targets,
            revision: Revision::Head,
            depth: Depth::Infinity,
        }
    }

    #[must_use]
    pub fn revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }
}

impl Action for SwitchOperation {
    fn message_key(&self) -> &str {
        messages::SWITCH
    }

    fn resources(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|target| target.working_copy.display())
            .collect()
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            self.targets.len() as u64,
        );
        let console = scope.console();
        let (revision, depth) = (self.revision, self.depth);
        for target in &self.targets {
            let wc = &target.working_copy;
            let label = wc.display();
            scope.protect_resource_step(&label, 1, |progress| {
                progress.set_task_label(&label);
                CommandLine::new("switch")
                    .path(&target.url)
                    .path(&label)
                    .revision(revision)
                    .depth(depth)
                    .username(wc.location.username()?.as_deref())
                    .echo(console);
                let proxy = wc.location.acquire()?;
                proxy.switch(&wc.path, &target.url, revision, depth)?;
                Ok(())
            });
        }
        Ok(())
    }
}

/// `svn commit`, one native call per location.
pub struct CommitOperation {
    working_copies: Vec<WorkingCopy>,
    message: String,
    depth: Depth,
    keep_locks: bool,
    revisions: Vec<(String, u64)>,
}

impl CommitOperation {
    pub fn new(working_copies: Vec<WorkingCopy>, message: &str) -> Self {
        Self {
            working_copies,
            message: message.to_string(),
            depth: Depth::Infinity,
            keep_locks: false,
            revisions: Vec::new(),
        }
    }

    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn keep_locks(mut self, keep_locks: bool) -> Self {
        self.keep_locks = keep_locks;
        self
    }

    /// Revisions committed by the last run, per location id.
    pub fn revisions(&self) -> &[(String, u64)] {
        &self.revisions
    }
}

impl Action for CommitOperation {
    fn message_key(&self) -> &str {
        messages::COMMIT
    }

    fn resources(&self) -> Vec<String> {
        display_all(&self.working_copies)
    }

    fn failed_resources(&self, errors: &[ErrorContainer]) -> Vec<String> {
        failed_in_groups(&self.working_copies, errors)
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        self.revisions.clear();
        let groups = group_by_location(&self.working_copies);
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            groups.len() as u64,
        );
        let console = scope.console();
        let (message, depth, keep_locks) = (self.message.as_str(), self.depth, self.keep_locks);
        for group in &groups {
            let paths = group.display_paths();
            let revisions = &mut self.revisions;
            scope.protect_resource_step(group.resource(), 1, |progress| {
                progress.set_task_label(&paths.join(" "));
                CommandLine::new("commit")
                    .paths(&paths)
                    .depth(depth)
                    .flag_if(keep_locks, "--no-unlock")
                    .quoted_option("-m", message)
                    .username(group.location.username()?.as_deref())
                    .echo(console);
                let proxy = group.location.acquire()?;
                match proxy.commit(&group.paths, message, depth)? {
                    Some(revision) => {
                        console.write(
                            ConsoleLevel::Ok,
                            &format!("Committed revision {}.", revision),
                        );
                        revisions.push((group.resource().to_string(), revision));
                    }
                    None => debug!("Nothing to commit in {}", paths.join(" ")),
                }
                Ok(())
            });
        }
        Ok(())
    }
}

/// `svn cleanup`, one protected step per working copy.
pub struct CleanupOperation {
    working_copies: Vec<WorkingCopy>,
}

impl CleanupOperation {
    pub fn new(working_copies: Vec<WorkingCopy>) -> Self {
        Self { working_copies }
    }
}

impl Action for CleanupOperation {
    fn message_key(&self) -> &str {
        messages::CLEANUP
    }

    fn resources(&self) -> Vec<String> {
        display_all(&self.working_copies)
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            self.working_copies.len() as u64,
        );
        let console = scope.console();
        for wc in &self.working_copies {
            let label = wc.display();
            scope.protect_resource_step(&label, 1, |progress| {
                progress.set_task_label(&label);
                CommandLine::new("cleanup").path(&label).echo(console);
                let proxy = wc.location.acquire()?;
                proxy.cleanup(&wc.path)
            });
        }
        Ok(())
    }
}

/// `svn relocate` of every working copy of one location, followed by moving
/// the location itself to the new root once all of them succeeded.
pub struct RelocateOperation {
    location: Arc<RepositoryLocation>,
    paths: Vec<PathBuf>,
    to_url: String,
}

impl RelocateOperation {
    pub fn new(location: Arc<RepositoryLocation>, paths: Vec<PathBuf>, to_url: &str) -> Self {
        Self {
            location,
            paths,
            to_url: to_url.to_string(),
        }
    }
}

impl Action for RelocateOperation {
    fn message_key(&self) -> &str {
        messages::RELOCATE
    }

    fn resources(&self) -> Vec<String> {
        self.paths.iter().map(|p| path_label(p)).collect()
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            self.paths.len() as u64 + 1,
        );
        let console = scope.console();
        let location = &self.location;
        let to_url = self.to_url.as_str();
        let from_url = location.url()?;
        let mut relocated_all = true;
        for path in &self.paths {
            let label = path_label(path);
            relocated_all &= scope.protect_resource_step(&label, 1, |progress| {
                progress.set_task_label(&label);
                CommandLine::new("relocate")
                    .path(&from_url)
                    .path(to_url)
                    .path(&label)
                    .echo(console);
                let proxy = location.acquire()?;
                proxy.relocate(&from_url, to_url, path)
            });
        }
        if !relocated_all {
            debug!("Location {} keeps {}: not every working copy moved", location.id(), from_url);
            return Ok(());
        }
        scope.protect_resource_step(location.id(), 1, |_| {
            let mut settings = location.settings()?;
            settings.url = to_url.to_string();
            location.reconfigure(settings)
        });
        Ok(())
    }
}

/// `svn revert`, one native call per location.
pub struct RevertOperation {
    working_copies: Vec<WorkingCopy>,
    depth: Depth,
}

impl RevertOperation {
    pub fn new(working_copies: Vec<WorkingCopy>) -> Self {
        Self {
            working_copies,
            depth: Depth::Infinity,
        }
    }

    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }
}

impl Action for RevertOperation {
    fn message_key(&self) -> &str {
        messages::REVERT
    }

    fn resources(&self) -> Vec<String> {
        display_all(&self.working_copies)
    }

    fn failed_resources(&self, errors: &[ErrorContainer]) -> Vec<String> {
        failed_in_groups(&self.working_copies, errors)
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        let groups = group_by_location(&self.working_copies);
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            groups.len() as u64,
        );
        let console = scope.console();
        let depth = self.depth;
        for group in &groups {
            let paths = group.display_paths();
            scope.protect_resource_step(group.resource(), 1, |progress| {
                progress.set_task_label(&paths.join(" "));
                CommandLine::new("revert")
                    .paths(&paths)
                    .flag_if(depth == Depth::Infinity, "-R")
                    .echo(console);
                let proxy = group.location.acquire()?;
                proxy.revert(&group.paths, depth)
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryConsole;
    use crate::memory::{FailureKind, FailureRule};
    use crate::operation::Operation;
    use crate::progress::NullProgress;
    use crate::status::ExecutionState;
    use crate::testing::{memory_location, shared_location};
    use std::path::Path;

    const ROOT: &str = "svn://host/repo";

    fn working_copies(location: &Arc<RepositoryLocation>, paths: &[&str]) -> Vec<WorkingCopy> {
        paths
            .iter()
            .map(|path| WorkingCopy::new(*path, location.clone()))
            .collect()
    }

    #[test]
    fn test_cleanup_attempts_every_working_copy() {
        let (factory, location) = memory_location("main", ROOT);
        let repository = factory.repository();
        for path in ["/wc/a", "/wc/b", "/wc/c"] {
            repository.add_working_copy(path, ROOT);
        }
        repository.inject(FailureRule::new("cleanup", Some("/wc/b"), FailureKind::Error));
        let wcs = working_copies(&location, &["/wc/a", "/wc/b", "/wc/c"]);
        let before = location.stats();

        let mut op = Operation::new(CleanupOperation::new(wcs));
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);

        assert_eq!(repository.calls_for("cleanup").len(), 3);
        assert_eq!(op.errors().len(), 1);
        assert_eq!(op.errors()[0].resource(), Some("/wc/b"));
        let after = location.stats();
        assert_eq!(after.acquired - before.acquired, 3);
        assert_eq!(after.released - before.released, 3);
        assert_eq!(after.outstanding, 0);
    }

    #[test]
    fn test_update_groups_by_location() {
        let (factory, first) = memory_location("first", ROOT);
        let second = shared_location(&factory, "second", "svn://host/other");
        let repository = factory.repository();
        repository.add_working_copy("/wc/a", ROOT);
        repository.add_working_copy("/wc/b", "svn://host/other");
        repository.add_working_copy("/wc/c", ROOT);
        let console = Arc::new(MemoryConsole::new());
        let wcs = vec![
            WorkingCopy::new("/wc/a", first.clone()),
            WorkingCopy::new("/wc/b", second.clone()),
            WorkingCopy::new("/wc/c", first.clone()),
        ];

        let mut op = Operation::new(UpdateOperation::new(wcs).depth(Depth::Immediates))
            .with_console(console.clone());
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(
            console.commands(),
            vec![
                "svn update \"/wc/a\" \"/wc/c\" -r HEAD --depth immediates".to_string(),
                "svn update \"/wc/b\" -r HEAD --depth immediates".to_string(),
            ]
        );
        assert_eq!(repository.calls_for("update").len(), 2);
        let updated = op.action::<UpdateOperation>().unwrap().updated_to();
        assert_eq!(updated[0].0, "first");
    }

    #[test]
    fn test_update_failure_maps_back_to_group_paths() {
        let (factory, first) = memory_location("first", ROOT);
        let second = shared_location(&factory, "second", "svn://host/other");
        let repository = factory.repository();
        repository.add_working_copy("/wc/a", ROOT);
        repository.add_working_copy("/wc/b", "svn://host/other");
        let wcs = vec![
            WorkingCopy::new("/wc/a", first),
            WorkingCopy::new("/wc/b", second),
            WorkingCopy::new("/wc/missing", shared_location(&factory, "third", "svn://host/third")),
        ];
        let mut op = Operation::new(UpdateOperation::new(wcs));
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(op.errors().len(), 1);
        assert_eq!(op.failed_resources(), vec!["/wc/missing".to_string()]);
    }

    #[test]
    fn test_commit_records_revisions_and_echoes_options() {
        let (factory, location) = memory_location("main", ROOT);
        let repository = factory.repository();
        repository.add_working_copy("/wc/a", ROOT);
        repository.modify("/wc/a");
        let console = Arc::new(MemoryConsole::new());
        let wcs = vec![WorkingCopy::new("/wc/a", location)];

        let mut op = Operation::new(CommitOperation::new(wcs, "fix build").keep_locks(true))
            .with_console(console.clone());
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(
            console.commands(),
            vec!["svn commit \"/wc/a\" --no-unlock -m \"fix build\"".to_string()]
        );
        assert_eq!(
            op.action::<CommitOperation>().unwrap().revisions(),
            &[("main".to_string(), 1)]
        );
        assert!(console.transcript().contains("Committed revision 1."));
    }

    #[test]
    fn test_commit_with_nothing_changed_is_ok() {
        let (factory, location) = memory_location("main", ROOT);
        factory.repository().add_working_copy("/wc/a", ROOT);
        let mut op = Operation::new(CommitOperation::new(
            vec![WorkingCopy::new("/wc/a", location)],
            "noop",
        ));
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert!(op.action::<CommitOperation>().unwrap().revisions().is_empty());
    }

    #[test]
    fn test_switch_each_target() {
        let (factory, location) = memory_location("main", ROOT);
        let repository = factory.repository();
        repository.add_remote("svn://host/repo/branches/b1");
        repository.add_working_copy("/wc/a", ROOT);
        let targets = vec![
            SwitchTarget {
                working_copy: WorkingCopy::new("/wc/a", location.clone()),
                url: "svn://host/repo/branches/b1".to_string(),
            },
            SwitchTarget {
                working_copy: WorkingCopy::new("/wc/none", location),
                url: "svn://host/repo/branches/b1".to_string(),
            },
        ];
        let mut op = Operation::new(SwitchOperation::new(targets));
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(
            repository.working_copy_url(Path::new("/wc/a")).as_deref(),
            Some("svn://host/repo/branches/b1")
        );
        assert_eq!(op.failed_resources(), vec!["/wc/none".to_string()]);
    }

    #[test]
    fn test_relocate_moves_working_copies_and_location() {
        let (factory, location) = memory_location("main", ROOT);
        let repository = factory.repository();
        repository.add_working_copy("/wc/a", "svn://host/repo/trunk");
        repository.add_working_copy("/wc/b", "svn://host/repo/branches/x");
        drop(location.acquire().unwrap());
        assert_eq!(location.stats().idle, 1);

        let action = RelocateOperation::new(
            location.clone(),
            vec![PathBuf::from("/wc/a"), PathBuf::from("/wc/b")],
            "https://mirror/repo",
        );
        let mut op = Operation::new(action);
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(
            repository.working_copy_url(Path::new("/wc/b")).as_deref(),
            Some("https://mirror/repo/branches/x")
        );
        assert_eq!(location.url().unwrap(), "https://mirror/repo");
        assert_eq!(location.stats().idle, 0);
    }

    #[test]
    fn test_relocate_keeps_location_when_a_working_copy_fails() {
        let (factory, location) = memory_location("main", ROOT);
        factory.repository().add_working_copy("/wc/a", "svn://host/repo/trunk");
        let action = RelocateOperation::new(
            location.clone(),
            vec![PathBuf::from("/wc/a"), PathBuf::from("/wc/unknown")],
            "https://mirror/repo",
        );
        let mut op = Operation::new(action);
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(location.url().unwrap(), ROOT);
        assert_eq!(op.failed_resources(), vec!["/wc/unknown".to_string()]);
    }

    #[test]
    fn test_revert_echoes_recursive_flag() {
        let (factory, location) = memory_location("main", ROOT);
        factory.repository().add_working_copy("/wc/a", ROOT);
        factory.repository().modify("/wc/a");
        let console = Arc::new(MemoryConsole::new());
        let mut op = Operation::new(RevertOperation::new(vec![WorkingCopy::new(
            "/wc/a", location,
        )]))
        .with_console(console.clone());
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(console.commands(), vec!["svn revert \"/wc/a\" -R".to_string()]);
    }
}
