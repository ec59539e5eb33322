//! # Console Audit Echo
//!
//! Before an operation performs a state-mutating native call it writes an
//! equivalent `svn ...` command line to a [`ConsoleSink`]. The echo is purely
//! for audit and display: `write` returns nothing, so a sink that fails to
//! write can never change an operation's outcome.
//!
//! Sinks provided here:
//!
//! - [`LogConsole`]: forwards lines to the `log` facade (target `svn_ops::console`).
//! - [`StdoutConsole`]: prints lines to stdout, styled with `console`.
//! - [`MemoryConsole`]: buffers lines, for transcripts and tests.
//! - [`NullConsole`]: discards everything.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use log::{error, info, warn};

use crate::connector::{Depth, Revision};

/// Severity of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// An echoed command line.
    Command,
    Ok,
    Warning,
    Error,
}

/// Destination for the human-readable audit echo.
pub trait ConsoleSink: Send + Sync {
    fn write(&self, level: ConsoleLevel, text: &str);

    /// Called when an operation starts running.
    fn mark_start(&self, _operation: &str) {}

    /// Called when an operation finishes, whatever its outcome.
    fn mark_end(&self) {}

    /// Called when an operation observes cancellation.
    fn mark_cancelled(&self) {}
}

/// Discards all output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsole;

impl ConsoleSink for NullConsole {
    fn write(&self, _level: ConsoleLevel, _text: &str) {}
}

/// Forwards console lines to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConsole;

impl ConsoleSink for LogConsole {
    fn write(&self, level: ConsoleLevel, text: &str) {
        match level {
            ConsoleLevel::Command | ConsoleLevel::Ok => {
                info!(target: "svn_ops::console", "{}", text)
            }
            ConsoleLevel::Warning => warn!(target: "svn_ops::console", "{}", text),
            ConsoleLevel::Error => error!(target: "svn_ops::console", "{}", text),
        }
    }

    fn mark_start(&self, operation: &str) {
        info!(target: "svn_ops::console", "*** {} ***", operation);
    }

    fn mark_cancelled(&self) {
        warn!(target: "svn_ops::console", "*** cancelled ***");
    }
}

/// Prints console lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutConsole {
    use_color: bool,
}

impl StdoutConsole {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn print(&self, line: String) {
        // Write errors (closed pipe, full disk) are ignored.
        let _ = writeln!(std::io::stdout().lock(), "{}", line);
    }
}

impl ConsoleSink for StdoutConsole {
    fn write(&self, level: ConsoleLevel, text: &str) {
        if !self.use_color {
            self.print(text.to_string());
            return;
        }
        let styled = match level {
            ConsoleLevel::Command => console::style(text).cyan(),
            ConsoleLevel::Ok => console::style(text),
            ConsoleLevel::Warning => console::style(text).yellow(),
            ConsoleLevel::Error => console::style(text).red(),
        };
        self.print(styled.to_string());
    }

    fn mark_start(&self, operation: &str) {
        self.print(format!("*** {} ***", operation));
    }

    fn mark_cancelled(&self) {
        self.print("*** cancelled ***".to_string());
    }
}

/// Buffers every line in memory.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<(ConsoleLevel, String)>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every buffered line with its level.
    pub fn lines(&self) -> Vec<(ConsoleLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns only the echoed command lines.
    pub fn commands(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(level, _)| *level == ConsoleLevel::Command)
            .map(|(_, text)| text)
            .collect()
    }

    /// Renders the buffer as plain text, one line per entry.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for (_, text) in self.lines() {
            out.push_str(&text);
            out.push('\n');
        }
        out
    }

    fn push(&self, level: ConsoleLevel, text: String) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, text));
    }
}

impl ConsoleSink for MemoryConsole {
    fn write(&self, level: ConsoleLevel, text: &str) {
        self.push(level, text.to_string());
    }

    fn mark_start(&self, operation: &str) {
        self.push(ConsoleLevel::Ok, format!("*** {} ***", operation));
    }

    fn mark_cancelled(&self) {
        self.push(ConsoleLevel::Warning, "*** cancelled ***".to_string());
    }
}

/// Builds the command-line form of a native action for the console echo.
///
/// ```
/// use svn_ops::console::CommandLine;
///
/// let line = CommandLine::new("cleanup").path("/wc/project").to_string();
/// assert_eq!(line, "svn cleanup \"/wc/project\"");
/// ```
#[derive(Debug, Clone)]
pub struct CommandLine {
    line: String,
}

impl CommandLine {
    pub fn new(verb: &str) -> Self {
        Self {
            line: format!("svn {}", verb),
        }
    }

    /// Appends a quoted path or URL argument.
    pub fn path(mut self, path: impl fmt::Display) -> Self {
        self.line.push_str(&format!(" \"{}\"", path));
        self
    }

    /// Appends several quoted arguments.
    pub fn paths<I, T>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        for path in paths {
            self = self.path(path);
        }
        self
    }

    /// Appends an option with an unquoted value.
    pub fn option(mut self, flag: &str, value: impl fmt::Display) -> Self {
        self.line.push_str(&format!(" {} {}", flag, value));
        self
    }

    /// Appends an option with a quoted value.
    pub fn quoted_option(mut self, flag: &str, value: impl fmt::Display) -> Self {
        self.line.push_str(&format!(" {} \"{}\"", flag, value));
        self
    }

    /// Appends `flag` only when `enabled`.
    pub fn flag_if(mut self, enabled: bool, flag: &str) -> Self {
        if enabled {
            self.line.push(' ');
            self.line.push_str(flag);
        }
        self
    }

    pub fn revision(self, revision: Revision) -> Self {
        self.option("-r", revision)
    }

    /// Appends `--depth` unless the depth is the verb default.
    pub fn depth(self, depth: Depth) -> Self {
        if depth == Depth::Infinity {
            self
        } else {
            self.option("--depth", depth)
        }
    }

    pub fn username(self, username: Option<&str>) -> Self {
        match username {
            Some(name) if !name.is_empty() => self.quoted_option("--username", name),
            _ => self,
        }
    }

    /// Writes the line to `sink` at command level.
    pub fn echo(self, sink: &dyn ConsoleSink) {
        sink.write(ConsoleLevel::Command, &self.line);
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}
