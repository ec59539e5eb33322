//! # CLI Command Implementations
//!
//! One module per `svn-ops` subcommand. Each defines an `Args` struct derived
//! with `clap` and an `execute` function that calls into the `svn_ops`
//! library to do the work.

pub mod completions;
pub mod run;
pub mod validate;
