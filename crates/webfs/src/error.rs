//! WebFS error types.

use std::io;
use thiserror::Error;

/// WebFS error type.
#[derive(Debug, Error)]
pub enum WebFsError {
    /// No volume is mounted under this name.
    #[error("volume not mounted: {0}")]
    NotMounted(String),

    /// No cached entry for the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed virtual or server URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Bad argument to a mount or scheduling call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The volume has no client, or connecting to the host failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The remote client returned no directory listing.
    #[error("no listing returned for {0}")]
    NoListing(String),

    /// Error reported by the remote client.
    #[error("remote error: {message}")]
    Remote {
        message: String,
        /// Worth another attempt.
        transient: bool,
    },

    /// The operation is not available on this volume or backend.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Foreground-only call made off the foreground thread, or the reverse.
    #[error("wrong thread: {0}")]
    WrongThread(&'static str),

    /// The service has been terminated.
    #[error("service terminated")]
    Terminated,

    /// The request was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Configuration parse error.
    #[error("RON parse error: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl WebFsError {
    /// Create a NotMounted error.
    pub fn not_mounted(name: impl Into<String>) -> Self {
        Self::NotMounted(name.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl(url.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a ConnectFailed error.
    pub fn connect_failed(host: impl Into<String>) -> Self {
        Self::ConnectFailed(host.into())
    }

    /// Create a NoListing error.
    pub fn no_listing(path: impl Into<String>) -> Self {
        Self::NoListing(path.into())
    }

    /// Create a permanent remote error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a remote error that may succeed on a second attempt.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a NotSupported error.
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the request pipeline should try again after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed(_) | Self::NoListing(_) | Self::Remote { transient: true, .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convert WebFsError to std::io::Error for callers that speak io.
impl From<WebFsError> for io::Error {
    fn from(e: WebFsError) -> Self {
        match e {
            WebFsError::NotMounted(msg) | WebFsError::NotFound(msg) => {
                io::Error::new(io::ErrorKind::NotFound, msg)
            }
            WebFsError::InvalidUrl(msg) | WebFsError::InvalidArgument(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            WebFsError::ConnectFailed(msg) => io::Error::new(io::ErrorKind::NotConnected, msg),
            WebFsError::NotSupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            WebFsError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, "cancelled"),
            WebFsError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// WebFS result type.
pub type WebFsResult<T> = Result<T, WebFsError>;
