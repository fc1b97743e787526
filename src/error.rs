//! Error types for the Teradata SQL driver.

use std::io;
use std::panic::Location;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Callers switch on this instead of matching every variant, the same way
/// application code distinguishes database failures from programming errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failure while establishing a session.
    Connection,
    /// The database rejected a statement on an open session.
    Operational,
    /// Operation on a closed session/cursor or in the wrong cursor state.
    State,
    /// Misuse of the driver API (bad escape syntax, bad binds, bad codec data).
    Interface,
    /// Local file or I/O failure (CSV files, password files).
    Io,
}

/// Error type for driver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on a local file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV reader/writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid connection parameter.
    #[error("Invalid connection parameter {name}: {message}")]
    InvalidConnectParam { name: String, message: String },

    /// Host could not be reached.
    #[error("Connection refused by {host}: {message}")]
    ConnectionRefused { host: String, message: String },

    /// Logon rejected.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Session creation timed out.
    #[error("Connection to {host} timed out after {timeout:?}")]
    ConnectionTimeout {
        host: String,
        timeout: std::time::Duration,
    },

    /// Database error reported for an executed request.
    #[error("[Error {code}] {message}")]
    Operational { code: u32, message: String },

    /// A request exceeded the session's request timeout.
    #[error("Request timed out after {timeout:?}")]
    RequestTimeout { timeout: std::time::Duration },

    /// Session already closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Cursor already closed.
    #[error("Cursor closed")]
    CursorClosed,

    /// Operation not valid in the current cursor or session state.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Malformed escape function.
    #[error("Escape syntax error: {message}")]
    EscapeSyntax { message: String },

    /// Bind values do not fit the request.
    #[error("Bind error: {message}")]
    Bind { message: String },

    /// Value could not be converted.
    #[error("Type conversion error: {message}")]
    TypeConversion { message: String },

    /// Stored password protection failure.
    #[error("Encrypted password error: {message}")]
    EncryptedPassword { message: String },

    /// Malformed codec data.
    #[error("Codec error: {message}")]
    Codec { message: String },

    /// Buffer too small.
    #[error("Buffer too small: need {needed} bytes, have {available} filed at {location}")]
    BufferTooSmall {
        needed: usize,
        available: usize,
        location: &'static Location<'static>,
    },

    /// Unknown field tag in a codec buffer.
    #[error("Unknown data type tag {tag:?} at offset {offset}")]
    UnknownTag { tag: char, offset: usize },

    /// Column not found.
    #[error("Column not found: {name}")]
    ColumnNotFound { name: String },
}

impl Error {
    /// Create an operational (database) error.
    pub fn operational(code: u32, message: impl Into<String>) -> Self {
        Self::Operational {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an escape syntax error.
    pub fn escape(message: impl Into<String>) -> Self {
        Self::EscapeSyntax {
            message: message.into(),
        }
    }

    /// Create a bind error.
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create an encrypted password error.
    pub fn encrypted_password(message: impl Into<String>) -> Self {
        Self::EncryptedPassword {
            message: message.into(),
        }
    }

    /// Create an invalid connection parameter error.
    pub fn connect_param(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConnectParam {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConnectParam { .. }
            | Error::ConnectionRefused { .. }
            | Error::AuthenticationFailed { .. }
            | Error::ConnectionTimeout { .. } => ErrorKind::Connection,
            Error::Operational { .. } | Error::RequestTimeout { .. } => ErrorKind::Operational,
            Error::ConnectionClosed | Error::CursorClosed | Error::InvalidState { .. } => {
                ErrorKind::State
            }
            Error::Io(_) | Error::Csv(_) => ErrorKind::Io,
            Error::Json(_)
            | Error::EscapeSyntax { .. }
            | Error::Bind { .. }
            | Error::TypeConversion { .. }
            | Error::EncryptedPassword { .. }
            | Error::Codec { .. }
            | Error::BufferTooSmall { .. }
            | Error::UnknownTag { .. }
            | Error::ColumnNotFound { .. } => ErrorKind::Interface,
        }
    }

    /// Whether the database rejected the request.
    pub fn is_operational(&self) -> bool {
        self.kind() == ErrorKind::Operational
    }

    /// Server error code, for operational errors.
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::Operational { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Human-readable message without the error-code prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Operational { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
