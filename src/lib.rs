//! # svn-ops
//!
//! A framework for composing version-control operations into jobs and running
//! them with failure containment, cancellation, progress reporting and pooled
//! native client connections.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use svn_ops::composite::CompositeOperation;
//! use svn_ops::location::{LocationSettings, RepositoryLocation};
//! use svn_ops::memory::MemoryConnectorFactory;
//! use svn_ops::operations::CreateFolderOperation;
//! use svn_ops::progress::NullProgress;
//! use svn_ops::status::ExecutionState;
//!
//! let factory = Arc::new(MemoryConnectorFactory::new());
//! factory.repository().add_remote("svn://example.com/repo");
//! let location = Arc::new(
//!     RepositoryLocation::new("main", LocationSettings::new("svn://example.com/repo"), factory)
//!         .unwrap(),
//! );
//!
//! let mut job = CompositeOperation::new("layout");
//! job.add_action(CreateFolderOperation::new(
//!     location,
//!     vec!["svn://example.com/repo/trunk".to_string()],
//!     "create trunk",
//! ));
//! assert_eq!(job.run(&NullProgress::new()), ExecutionState::Ok);
//! ```
//!
//! ## Core Concepts
//!
//! - **Operations (`operation`)**: An [`operation::Action`] describes what to
//!   do; an [`operation::Operation`] runs it once, contains every failure of
//!   its protected steps as [`status::ErrorContainer`]s and ends in a terminal
//!   [`status::ExecutionState`].
//! - **Composites (`composite`)**: Ordered, dependency-gated sequences of
//!   operations that keep going past failures and stop on cancellation.
//! - **Locations (`location`, `registry`)**: Repository endpoints with a
//!   thread-reentrant pool of native client proxies, leased per step.
//! - **Connectors (`connector`, `memory`)**: The native verb surface, with an
//!   in-memory implementation used for simulation and tests.
//! - **Plans (`config`, `plan`)**: YAML files declaring locations and jobs,
//!   built into runnable composites.

pub mod call_context;
pub mod composite;
pub mod config;
pub mod connector;
pub mod console;
pub mod error;
pub mod location;
pub mod memory;
pub mod messages;
pub mod operation;
pub mod operations;
pub mod output;
pub mod plan;
pub mod progress;
pub mod registry;
pub mod status;

#[cfg(test)]
mod composite_proptest;
#[cfg(test)]
mod testing;
