//! # Run Command Implementation
//!
//! Loads a plan, builds one composite operation per job and runs them against
//! the simulated repository described by the plan.
//!
//! - Jobs run one after another, or concurrently with `--parallel`. Each job
//!   stays sequential internally.
//! - A progress bar is drawn on stderr unless `--quiet` or `--json` is given.
//! - Ctrl-C requests cancellation: the running step finishes, everything not
//!   yet started is skipped.
//! - The command fails when any job ended in error. A cancelled run is
//!   reported but is not a failure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use log::warn;

use svn_ops::composite::RunSummary;
use svn_ops::config::{self, DEFAULT_PLAN_FILE};
use svn_ops::console::{ConsoleSink, LogConsole, MemoryConsole};
use svn_ops::output::{emoji, error_line, job_line, styled_state, OutputConfig};
use svn_ops::plan::Plan;
use svn_ops::progress::{BarProgress, CancellationFlag};
use svn_ops::status::ExecutionState;

/// Run the jobs of a plan file
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the plan file.
    #[arg(short, long, value_name = "FILE", env = "SVN_OPS_PLAN", default_value = DEFAULT_PLAN_FILE)]
    pub plan: PathBuf,

    /// Run independent jobs concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Print the command echo of every operation.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print the run summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// Write the command echo of every operation to this file.
    #[arg(long, value_name = "FILE")]
    pub transcript: Option<PathBuf>,
}

/// Execute the `run` command.
pub fn execute(args: RunArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let plan_config = config::from_file(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;

    let transcript = (args.verbose || args.transcript.is_some()).then(|| Arc::new(MemoryConsole::new()));
    let console: Arc<dyn ConsoleSink> = match &transcript {
        Some(memory) => memory.clone(),
        None => Arc::new(LogConsole),
    };

    let flag = CancellationFlag::new();
    let handler_flag = flag.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!("Ctrl-C will not cancel this run: {}", e);
    }

    let mut plan = Plan::build(&plan_config, console)?;
    let bar = if args.quiet || args.json {
        BarProgress::hidden(flag)
    } else {
        BarProgress::new(flag)
    };
    let summaries = plan.run(&bar, args.parallel);
    bar.finish();

    if let (Some(memory), Some(path)) = (&transcript, &args.transcript) {
        std::fs::write(path, memory.transcript())
            .with_context(|| format!("Failed to write transcript {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        if args.verbose {
            if let Some(memory) = &transcript {
                print!("{}", memory.transcript());
            }
        }
        report(&out, &summaries, args.quiet);
    }

    let failed = summaries
        .iter()
        .filter(|s| s.state == ExecutionState::Error)
        .count();
    if summaries.iter().any(|s| s.state == ExecutionState::Cancelled) {
        eprintln!("{} Run cancelled", emoji(&out, "⏹️", "[CANCELLED]"));
    }
    // Failures decide the exit code even when another job was cancelled.
    if plan.overall_state() == ExecutionState::Error {
        anyhow::bail!("{} of {} job(s) failed", failed, summaries.len())
    }
    Ok(())
}
