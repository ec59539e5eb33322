//! # Error Handling
//!
//! This module defines the centralized error type for `svn-ops`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! the framework can observe, from plan parsing to native client calls.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Struct variants carry the context needed to
//!   render a short user-facing message (the verb, the target path or URL, the
//!   operation id).
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Classification
//!
//! Every error maps onto one [`Severity`] through [`Error::severity`]:
//!
//! - `Cancelled` is a user-requested stop, never shown as an error dialog.
//! - `Internal` and `LockPoisoned` are invariant violations (FATAL). They flow
//!   through the same containment path as ordinary failures but are tagged so
//!   a presentation layer can render them differently.
//! - Everything else is an ordinary, reportable ERROR.

use thiserror::Error;

use crate::status::Severity;

/// Main error type for svn-ops
#[derive(Error, Debug)]
pub enum Error {
    /// An error occurred while parsing or validating a plan file.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// The native client rejected or failed a verb.
    #[error("svn {verb} failed for {target}: {message}")]
    Connector {
        verb: String,
        target: String,
        message: String,
    },

    /// The native client could not reach the repository.
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// The user requested cancellation, or the native call reported it.
    #[error("Operation cancelled: {context}")]
    Cancelled { context: String },

    /// An internal invariant was violated.
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// A dependency edge referenced an operation that is not a member of the
    /// composite it was added to.
    #[error("Invalid dependency for {operation}: {message}")]
    InvalidDependency { operation: String, message: String },

    /// No repository location is registered under this id.
    #[error("Repository location not found: {id}")]
    LocationNotFound { id: String },

    /// A repository location with this id is already registered.
    #[error("Repository location already exists: {id}")]
    DuplicateLocation { id: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Shorthand for a native client failure.
    pub fn connector(verb: &str, target: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Connector {
            verb: verb.to_string(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a cancellation.
    pub fn cancelled(context: impl Into<String>) -> Self {
        Error::Cancelled {
            context: context.into(),
        }
    }

    /// Shorthand for an internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Classifies this error for containment.
    pub fn severity(&self) -> Severity {
        match self {
            Error::Cancelled { .. } => Severity::Cancelled,
            Error::Internal { .. } | Error::LockPoisoned { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns true if this error represents a user-requested stop.
    pub fn is_cancellation(&self) -> bool {
        self.severity() == Severity::Cancelled
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
