//! Error types for region routing.

use thiserror::Error;

/// Result type alias for region routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A request attempt failed with a classified routing error.
    #[error(transparent)]
    Request(#[from] RequestFailure),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// Wire encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

/// How the retry loop should treat a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A fresh attempt, possibly against a corrected leader or store, may succeed.
    Unavailable,
    /// The cached region definition is wrong. Re-resolve the region before retrying.
    RegionStale,
    /// Retrying will not help.
    Fatal,
}

impl FailureKind {
    /// Stable label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unavailable => "unavailable",
            FailureKind::RegionStale => "region_stale",
            FailureKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of a failed attempt, handed to the retry loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {description}")]
pub struct RequestFailure {
    /// Classification.
    pub kind: FailureKind,
    /// Human-readable description carrying the store's error text.
    pub description: String,
}

impl RequestFailure {
    /// Create a failure.
    pub fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// A retryable failure.
    pub fn unavailable(description: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, description)
    }

    /// A failure requiring the region to be reloaded.
    pub fn region_stale(description: impl Into<String>) -> Self {
        Self::new(FailureKind::RegionStale, description)
    }

    /// A non-retryable failure.
    pub fn fatal(description: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, description)
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, FailureKind::Fatal)
    }

    /// Whether the region must be re-resolved before the next attempt.
    pub fn requires_region_reload(&self) -> bool {
        matches!(self.kind, FailureKind::RegionStale)
    }
}
