//! Error kinds surfaced through the runtime's single error callback.
//!
//! Errors never cross thread boundaries as panics or `Result` returns from
//! the worker threads; they are handed to the user's error callback and the
//! workers keep running.

/// Error kind, mirrored into every `Error` event delivered to user callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionFailed,
    ConnectionClosed,
    AuthenticationFailed,
    InvalidSymbol,
    InvalidOrder,
    RateLimited,
    ParseError,
    ChecksumMismatch,
    QueueOverflow,
    Timeout,
    CallbackError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::ConnectionClosed => "connection_closed",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::InvalidSymbol => "invalid_symbol",
            ErrorKind::InvalidOrder => "invalid_order",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::ChecksumMismatch => "checksum_mismatch",
            ErrorKind::QueueOverflow => "queue_overflow",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CallbackError => "callback_error",
        }
    }
}

/// A helper Result type for fallible, synchronous operations (construction,
/// one-shot sends). The steady-state I/O/dispatch loops report failures via
/// [`ErrorKind`] to the error callback instead of returning `Result`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect: {0}")]
    ConnectFailed(#[from] tungstenite::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("failed to (de)serialize message: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{kind:?}: {message}")]
    Kind {
        kind: ErrorKind,
        message: String,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConnectFailed(_) => ErrorKind::ConnectionFailed,
            Error::InvalidUrl(_) => ErrorKind::ConnectionFailed,
            Error::ConnectionClosed { .. } => ErrorKind::ConnectionClosed,
            Error::Serde(_) => ErrorKind::ParseError,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Kind { kind, .. } => *kind,
        }
    }
}
