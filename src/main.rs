//! # svn-ops CLI
//!
//! Binary entry point for the `svn-ops` command-line tool.
//!
//! It parses arguments with `clap`, sets up logging and dispatches to the
//! command implementations in `commands`. Plan loading, job building and
//! execution live in the `svn_ops` library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
