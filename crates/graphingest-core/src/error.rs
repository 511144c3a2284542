//! Common error type for graph store sessions

use std::fmt;

/// Error from a store session: connecting, writing a batch, or running a statement.
///
/// Wraps a transport failure, a statement the store rejected, or a local I/O error.
#[derive(Debug)]
pub enum StoreError {
    /// Transport-level failure with optional HTTP status
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Statement rejected by the store, with its status code
    Rejected { code: String, message: String },
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Rejected { code, message } => write!(f, "{code}: {message}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl StoreError {
    /// Whether a second attempt may succeed.
    ///
    /// Network errors without a status, 429 and 5xx are transient; so are
    /// `Neo.TransientError.*` codes (deadlocks, lock timeouts).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(s), ..
            } => *s == 429 || *s >= 500,
            Self::Rejected { code, .. } => code.starts_with("Neo.TransientError."),
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}
