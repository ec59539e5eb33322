//! Operations against the repository itself.

use std::path::PathBuf;
use std::sync::Arc;

use crate::connector::{Depth, Revision};
use crate::console::{CommandLine, ConsoleLevel};
use crate::error::Result;
use crate::location::RepositoryLocation;
use crate::messages;
use crate::operation::{Action, OperationScope};

use super::path_label;

/// `svn mkdir`: creates remote folders, one protected step per URL.
pub struct CreateFolderOperation {
    location: Arc<RepositoryLocation>,
    urls: Vec<String>,
    message: String,
    make_parents: bool,
    created: Vec<(String, u64)>,
}

impl CreateFolderOperation {
    pub fn new(location: Arc<RepositoryLocation>, urls: Vec<String>, message: &str) -> Self {
        Self {
            location,
            urls,
            message: message.to_string(),
            make_parents: false,
            created: Vec::new(),
        }
    }

    #[must_use]
    pub fn make_parents(mut self, make_parents: bool) -> Self {
        self.make_parents = make_parents;
        self
    }

    /// Folders created by the last run with the revision that created them.
    pub fn created(&self) -> &[(String, u64)] {
        &self.created
    }
}

impl Action for CreateFolderOperation {
    fn message_key(&self) -> &str {
        messages::CREATE_REMOTE_FOLDER
    }

    fn resources(&self) -> Vec<String> {
        self.urls.clone()
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        self.created.clear();
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            self.urls.len() as u64,
        );
        let console = scope.console();
        for url in &self.urls {
            let location = &self.location;
            let message = &self.message;
            let make_parents = self.make_parents;
            let created = &mut self.created;
            scope.protect_resource_step(url, 1, |progress| {
                progress.set_task_label(url);
                CommandLine::new("mkdir")
                    .path(url)
                    .flag_if(make_parents, "--parents")
                    .quoted_option("-m", message)
                    .username(location.username()?.as_deref())
                    .echo(console);
                let proxy = location.acquire()?;
                let revision = proxy.mkdir(std::slice::from_ref(url), message, make_parents)?;
                created.push((url.clone(), revision));
                Ok(())
            });
        }
        Ok(())
    }
}

/// `svn checkout`: checks a remote folder out into a local directory.
pub struct CheckoutOperation {
    location: Arc<RepositoryLocation>,
    url: String,
    destination: PathBuf,
    revision: Revision,
    depth: Depth,
    checked_out: Option<u64>,
}

impl CheckoutOperation {
    pub fn new(
        location: Arc<RepositoryLocation>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            location,
            url: url.into(),
            destination: destination.into(),
            revision: Revision::Head,
            depth: Depth::Infinity,
            checked_out: None,
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

    /// Revision checked out by the last run.
    pub fn checked_out(&self) -> Option<u64> {
        self.checked_out
    }
}

impl Action for CheckoutOperation {
    fn message_key(&self) -> &str {
        messages::CHECKOUT
    }

    fn resources(&self) -> Vec<String> {
        vec![path_label(&self.destination)]
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        self.checked_out = None;
        scope.begin_task(&messages::operation_name(self.message_key()), 1);
        let console = scope.console();
        let label = path_label(&self.destination);
        let Self {
            location,
            url,
            destination,
            revision,
            depth,
            checked_out,
        } = self;
        let (url, destination, revision, depth) = (url.as_str(), destination.as_path(), *revision, *depth);
        scope.protect_resource_step(&label, 1, |progress| {
            progress.set_task_label(url);
            CommandLine::new("checkout")
                .path(url)
                .path(&label)
                .revision(revision)
                .depth(depth)
                .username(location.username()?.as_deref())
                .echo(console);
            let proxy = location.acquire()?;
            *checked_out = Some(proxy.checkout(url, destination, revision, depth)?);
            Ok(())
        });
        if let Some(revision) = self.checked_out {
            scope.write_to_console(
                ConsoleLevel::Ok,
                &format!("Checked out revision {}.", revision),
            );
        }
        Ok(())
    }
}
