//! # Output Configuration
//!
//! Controls how the `svn-ops` binary decorates its output: whether run
//! summaries use color and emoji markers, and how execution states and
//! error containers are rendered.
//!
//! Color is decided from the `--color=never|always|auto` flag and, in auto
//! mode, from `NO_COLOR`, `CLICOLOR`, `CLICOLOR_FORCE`, `TERM=dumb` and
//! whether stdout is a terminal.
//!
//! ```rust,ignore
//! use svn_ops::output::{emoji, OutputConfig};
//!
//! let out = OutputConfig::from_env_and_flag("auto");
//! println!("{} Running plan...", emoji(&out, "🚀", "[RUN]"));
//! ```

use std::env;

use console::style;

use crate::composite::{ErrorSummary, RunSummary};
use crate::status::{ExecutionState, Severity};

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolves the `--color` flag value ("always", "never" or "auto").
    ///
    /// `always` wins over `NO_COLOR`; `auto` inspects the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // https://no-color.org/: presence alone disables color
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `emoji_str` when color is enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Marker shown in front of a job or operation in the given state.
pub fn state_marker(config: &OutputConfig, state: ExecutionState) -> &'static str {
    match state {
        ExecutionState::Ok => emoji(config, "✅", "[OK]"),
        ExecutionState::Error => emoji(config, "❌", "[ERR]"),
        ExecutionState::Cancelled => emoji(config, "⏹️", "[CANCELLED]"),
        ExecutionState::NotExecuted => emoji(config, "⏭️", "[SKIP]"),
    }
}

/// The state name, colored by outcome when color is enabled.
pub fn styled_state(config: &OutputConfig, state: ExecutionState) -> String {
    let label = state.to_string();
    if !config.use_color {
        return label;
    }
    match state {
        ExecutionState::Ok => style(label).green().to_string(),
        ExecutionState::Error => style(label).red().bold().to_string(),
        ExecutionState::Cancelled => style(label).yellow().to_string(),
        ExecutionState::NotExecuted => style(label).dim().to_string(),
    }
}

/// One line per job: "N succeeded, M failed, K skipped".
pub fn job_line(config: &OutputConfig, summary: &RunSummary) -> String {
    let mut line = format!(
        "{} {}: {} succeeded, {} failed, {} skipped",
        state_marker(config, summary.state),
        summary.name,
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    if summary.cancelled > 0 {
        line.push_str(&format!(", {} cancelled", summary.cancelled));
    }
    line
}

/// An error container with its cause, indented under its operation.
pub fn error_line(config: &OutputConfig, operation_id: &str, error: &ErrorSummary) -> String {
    let marker = match error.severity {
        Severity::Warning => emoji(config, "⚠️", "[WARN]"),
        Severity::Cancelled => emoji(config, "⏹️", "[CANCELLED]"),
        Severity::Ok => emoji(config, "ℹ️", "[INFO]"),
        Severity::Error | Severity::Fatal => emoji(config, "❌", "[ERR]"),
    };
    match &error.cause {
        Some(cause) => format!("   {} [{}] {}: {}", marker, operation_id, error.message, cause),
        None => format!("   {} [{}] {}", marker, operation_id, error.message),
    }
}
