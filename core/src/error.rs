//! Error types for the nucleation engine, grounded on the five kinds
//! called out for the core: configuration, parse, validation, transient
//! I/O, and invariant-violation ("bug") errors. `NoResult` is not a
//! variant here — it is represented at each call site as a sentinel
//! (`-1.0`, `None`, or an empty `Vec`), matching the original's
//! `double`-returning APIs.

use std::sync::PoisonError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlassError {
    /// Missing/mistyped required configuration key, wrong `Cmd`/
    /// `Configuration` tag, malformed travel-time file.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Unparseable input message.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Parse succeeded but required fields are absent or out of range.
    #[error("validation error: {field}: {message}")]
    Validate { field: String, message: String },

    /// Queue full, downstream slow; caller should back off and retry.
    #[error("transient I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An invariant the code relies on did not hold. Logged at `error!`
    /// and surfaced as thread death via the health check.
    #[error("invariant violation: {message}")]
    Bug { message: String },
}

impl GlassError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn validate(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validate {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn bug(message: impl Into<String>) -> Self {
        Self::Bug {
            message: message.into(),
        }
    }

    /// Category tag for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Parse { .. } => "parse",
            Self::Validate { .. } => "validate",
            Self::Io(_) => "io",
            Self::Bug { .. } => "bug",
        }
    }

    /// Whether this error represents a transient condition a caller
    /// should retry, as opposed to one that should abort startup or
    /// kill a worker.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// A poisoned lock means another thread already panicked inside a
/// critical section — that is an invariant violation, not something a
/// caller can usefully retry.
impl<T> From<PoisonError<T>> for GlassError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Bug {
            message: format!("lock poisoned: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, GlassError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_matches_variant() {
        assert_eq!(GlassError::config("x").category(), "config");
        assert_eq!(GlassError::bug("x").category(), "bug");
    }

    #[test]
    fn io_errors_are_transient() {
        let e = GlassError::from(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(e.is_transient());
        assert!(!GlassError::bug("x").is_transient());
    }
}
