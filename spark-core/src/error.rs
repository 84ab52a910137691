//! Error types for spark-core.

use thiserror::Error;

/// Result type alias using spark-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the ingestion, bridge, and advisory subsystems.
///
/// Validation failures never reach the queue; transient I/O is retried by
/// the caller with jittered backoff; `Fatal` is reserved for conditions the
/// daemon cannot start with.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or oversized event rejected at the ingest boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// Disk, lock, or network hiccup expected to be transient.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// The event queue is append-only; this signals a detected or attempted
    /// violation of that invariant (e.g. a cursor moving backwards).
    #[error("queue integrity error: {0}")]
    QueueIntegrity(String),

    /// The quality gate itself raised instead of returning a verdict. The
    /// caller fails open: quarantine the candidate and still store it.
    #[error("quality gate exception: {0}")]
    QualityGateException(String),

    /// Configuration could not be parsed, or a required section was absent
    /// while the feature it configures is enabled.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required state-directory path could not be created or opened.
    #[error("state directory error: {0}")]
    StateDir(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An external call (Mind service, AI synthesis endpoint) exceeded its
    /// deadline.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Unable to open, lock, or start the daemon at all. Non-zero exit.
    #[error("fatal startup error: {0}")]
    Fatal(String),

    /// Anything else; kept narrow and rare by design.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient_io(msg: impl Into<String>) -> Self {
        Self::TransientIo(msg.into())
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors a retrying caller should back off and retry rather
    /// than give up on immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientIo(_) | Error::Timeout { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::TransientIo(e.to_string())
    }
}
