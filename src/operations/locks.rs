//! `svn lock` / `svn unlock`, one native call per location.

use crate::console::CommandLine;
use crate::error::Result;
use crate::messages;
use crate::operation::{Action, OperationScope};
use crate::status::ErrorContainer;

use super::{display_all, failed_in_groups, group_by_location, WorkingCopy};

pub struct LockOperation {
    working_copies: Vec<WorkingCopy>,
    comment: String,
    force: bool,
}

impl LockOperation {
    pub fn new(working_copies: Vec<WorkingCopy>, comment: &str) -> Self {
        Self {
            working_copies,
            comment: comment.to_string(),
            force: false,
        }
    }

    /// Steals locks held by other users.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Action for LockOperation {
    fn message_key(&self) -> &str {
        messages::LOCK
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
        let (comment, force) = (self.comment.as_str(), self.force);
        for group in &groups {
            let paths = group.display_paths();
            scope.protect_resource_step(group.resource(), 1, |progress| {
                progress.set_task_label(&paths.join(" "));
                CommandLine::new("lock")
                    .paths(&paths)
                    .flag_if(force, "--force")
                    .quoted_option("-m", comment)
                    .username(group.location.username()?.as_deref())
                    .echo(console);
                let proxy = group.location.acquire()?;
                proxy.lock(&group.paths, comment, force)
            });
        }
        Ok(())
    }
}

pub struct UnlockOperation {
    working_copies: Vec<WorkingCopy>,
    force: bool,
}

impl UnlockOperation {
    pub fn new(working_copies: Vec<WorkingCopy>) -> Self {
        Self {
            working_copies,
            force: false,
        }
    }

    /// Breaks locks held by other users.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Action for UnlockOperation {
    fn message_key(&self) -> &str {
        messages::UNLOCK
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
        let force = self.force;
        for group in &groups {
            let paths = group.display_paths();
            scope.protect_resource_step(group.resource(), 1, |progress| {
                progress.set_task_label(&paths.join(" "));
                CommandLine::new("unlock")
                    .paths(&paths)
                    .flag_if(force, "--force")
                    .username(group.location.username()?.as_deref())
                    .echo(console);
                let proxy = group.location.acquire()?;
                proxy.unlock(&group.paths, force)
            });
        }
        Ok(())
    }
}
