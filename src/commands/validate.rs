//! # Validate Command Implementation
//!
//! Parses and validates a plan file without running anything, then prints a
//! summary of its locations and jobs.
//!
//! Validation covers everything the plan builder relies on: the YAML shape,
//! unique location and operation ids, known locations, `depends_on` entries
//! naming earlier operations, absolute URLs and non-empty jobs.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use svn_ops::config::{self, DEFAULT_PLAN_FILE};
use svn_ops::output::{emoji, OutputConfig};

/// Validate a plan file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the plan file to validate.
    #[arg(short, long, value_name = "FILE", env = "SVN_OPS_PLAN", default_value = DEFAULT_PLAN_FILE)]
    pub plan: PathBuf,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    println!(
        "{} Validating plan: {}",
        emoji(&out, "🔍", "[SCAN]"),
        args.plan.display()
    );

    let plan = match config::from_file(&args.plan) {
        Ok(plan) => plan,
        Err(e) => {
            println!("{} Plan is invalid: {}", emoji(&out, "❌", "[ERR]"), e);
            return Err(anyhow::anyhow!("Plan validation failed: {}", e));
        }
    };

    println!("\n{} Plan Summary:", emoji(&out, "📊", "[INFO]"));
    println!("   Locations: {}", plan.locations.len());
    for location in &plan.locations {
        match &location.username {
            Some(username) => println!("     {} {} (as {})", location.id, location.url, username),
            None => println!("     {} {}", location.id, location.url),
        }
    }
    println!("   Jobs: {}", plan.jobs.len());
    for job in &plan.jobs {
        println!("     {} ({} operation(s))", job.name, job.operations.len());
        for operation in &job.operations {
            if operation.depends_on.is_empty() {
                println!("       {} {}", operation.id, operation.kind.name());
            } else {
                println!(
                    "       {} {} after {}",
                    operation.id,
                    operation.kind.name(),
                    operation.depends_on.join(", ")
                );
            }
        }
    }
    println!("   Total operations: {}", plan.operation_count());
    println!("   Proxy cache size: {}", plan.settings.proxy_cache_size);

    let simulation = &plan.simulation;
    if !simulation.failures.is_empty() {
        println!(
            "\n{} {} injected failure(s) in the simulation",
            emoji(&out, "⚠️", "[WARN]"),
            simulation.failures.len()
        );
    }

    println!("\n{} Plan is valid", emoji(&out, "✅", "[OK]"));
    Ok(())
}
