//! # Concrete Operations
//!
//! Each operation binds its inputs at construction and, when run:
//!
//! 1. echoes the equivalent `svn ...` command line to the console,
//! 2. leases a proxy from the resource's location for the duration of one
//!    protected step (the [`ProxyLease`](crate::location::ProxyLease) is
//!    released when the step ends, whatever its outcome),
//! 3. contains failures per resource, or per location for verbs that take
//!    several paths in one native call.
//!
//! Grouped operations attribute a failure to the id of the location whose
//! call failed, and map it back to the paths of that group when asked for
//! their failed resources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::location::RepositoryLocation;
use crate::status::ErrorContainer;

mod locks;
mod properties;
mod remote;
mod working_copy;

pub use locks::{LockOperation, UnlockOperation};
pub use properties::{RemovePropertiesOperation, SetPropertiesOperation};
pub use remote::{CheckoutOperation, CreateFolderOperation};
pub use working_copy::{
    CleanupOperation, CommitOperation, RelocateOperation, RevertOperation, SwitchOperation,
    SwitchTarget, UpdateOperation,
};

/// A local working copy and the location it was checked out from.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    pub path: PathBuf,
    pub location: Arc<RepositoryLocation>,
}

impl WorkingCopy {
    pub fn new(path: impl Into<PathBuf>, location: Arc<RepositoryLocation>) -> Self {
        Self {
            path: path.into(),
            location,
        }
    }

    pub fn display(&self) -> String {
        self.path.display().to_string()
    }
}

/// Working copies that share one location, in first-seen order.
pub(crate) struct LocationGroup {
    pub location: Arc<RepositoryLocation>,
    pub paths: Vec<PathBuf>,
}

impl LocationGroup {
    pub fn resource(&self) -> &str {
        self.location.id()
    }

    pub fn display_paths(&self) -> Vec<String> {
        self.paths.iter().map(|p| p.display().to_string()).collect()
    }
}

pub(crate) fn group_by_location(working_copies: &[WorkingCopy]) -> Vec<LocationGroup> {
    let mut groups: Vec<LocationGroup> = Vec::new();
    for wc in working_copies {
        match groups
            .iter_mut()
            .find(|group| Arc::ptr_eq(&group.location, &wc.location))
        {
            Some(group) => group.paths.push(wc.path.clone()),
            None => groups.push(LocationGroup {
                location: wc.location.clone(),
                paths: vec![wc.path.clone()],
            }),
        }
    }
    groups
}

pub(crate) fn display_all(working_copies: &[WorkingCopy]) -> Vec<String> {
    working_copies.iter().map(WorkingCopy::display).collect()
}

/// Paths whose location group has a recorded failure.
pub(crate) fn failed_in_groups(
    working_copies: &[WorkingCopy],
    errors: &[ErrorContainer],
) -> Vec<String> {
    working_copies
        .iter()
        .filter(|wc| {
            errors
                .iter()
                .any(|e| e.is_failure() && e.resource() == Some(wc.location.id()))
        })
        .map(WorkingCopy::display)
        .collect()
}

pub(crate) fn path_label(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::memory_location;

    #[test]
    fn test_group_by_location_keeps_first_seen_order() {
        let (_, a) = memory_location("a", "svn://host/a");
        let (_, b) = memory_location("b", "svn://host/b");
        let wcs = vec![
            WorkingCopy::new("/wc/b1", b.clone()),
            WorkingCopy::new("/wc/a1", a.clone()),
            WorkingCopy::new("/wc/b2", b.clone()),
        ];
        let groups = group_by_location(&wcs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].resource(), "b");
        assert_eq!(groups[0].display_paths(), vec!["/wc/b1", "/wc/b2"]);
        assert_eq!(groups[1].paths, vec![PathBuf::from("/wc/a1")]);
    }

    #[test]
    fn test_failed_in_groups_expands_location_failures() {
        let (_, a) = memory_location("a", "svn://host/a");
        let (_, b) = memory_location("b", "svn://host/b");
        let wcs = vec![
            WorkingCopy::new("/wc/a1", a.clone()),
            WorkingCopy::new("/wc/b1", b.clone()),
            WorkingCopy::new("/wc/a2", a),
        ];
        let errors = vec![ErrorContainer::from_error(
            "update",
            Some("a"),
            "Failed to update a".to_string(),
            Error::connector("update", "/wc/a1 /wc/a2", "out of date"),
        )];
        assert_eq!(failed_in_groups(&wcs, &errors), vec!["/wc/a1", "/wc/a2"]);
    }
}
