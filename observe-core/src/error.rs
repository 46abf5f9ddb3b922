//! Error Types
//!
//! Two kinds of failure flow through the engine:
//!
//! - [`ObserveError`] is returned synchronously to the caller that passed a
//!   bad argument (a malformed path, a second `open`, ...). These fail fast.
//!
//! - [`Diagnostic`] is the soft-failure carrier. Listener callbacks and
//!   converters return it; the delivery boundary logs it and keeps going.

use std::fmt::Display;

use thiserror::Error;

/// Errors reported to the caller of an observation API.
#[derive(Debug, Error)]
pub enum ObserveError {
    /// The path string could not be parsed.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A container observer was pointed at a value that is not a container.
    #[error("cannot observe a value of type {0}")]
    NotObservable(&'static str),

    /// `open` was called on an observer that is already open.
    #[error("observer has already been opened")]
    AlreadyOpened,

    /// The observer was closed and cannot be used again.
    #[error("observer is closed")]
    Closed,

    /// Sources cannot be added to an aggregate after it has been opened.
    #[error("cannot add sources once the aggregate is open")]
    SourcesLocked,

    /// Scheduler configuration could not be parsed.
    #[error("invalid scheduler config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Crate result alias.
pub type Result<T, E = ObserveError> = std::result::Result<T, E>;

/// A logged, non-fatal failure raised by a listener or converter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Diagnostic {
    message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for Diagnostic {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for Diagnostic {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Return types accepted from user callbacks.
///
/// Lets a callback be written either as a plain closure returning `()` or as
/// one returning `Result<(), E>` for any displayable error. Errors are turned
/// into a [`Diagnostic`] and logged at the delivery boundary.
pub trait ListenerOutcome {
    fn into_outcome(self) -> Result<(), Diagnostic>;
}

impl ListenerOutcome for () {
    fn into_outcome(self) -> Result<(), Diagnostic> {
        Ok(())
    }
}

impl<E: Display> ListenerOutcome for std::result::Result<(), E> {
    fn into_outcome(self) -> Result<(), Diagnostic> {
        self.map_err(|e| Diagnostic::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_outcome_is_ok() {
        assert!(().into_outcome().is_ok());
    }

    #[test]
    fn error_outcome_becomes_diagnostic() {
        let outcome: std::result::Result<(), String> = Err("boom".to_string());
        let diag = outcome.into_outcome().unwrap_err();
        assert_eq!(diag.message(), "boom");
    }

    #[test]
    fn invalid_path_message_names_the_path() {
        let err = ObserveError::InvalidPath {
            path: "a..b".into(),
            reason: "empty segment",
        };
        assert_eq!(err.to_string(), "invalid path `a..b`: empty segment");
    }
}
