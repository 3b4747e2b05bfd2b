//! Error types for staticd

use std::fmt;
use std::io;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for server lifecycle operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Listening socket could not be created, bound or put into listen mode
    Listen {
        /// Port that was requested
        port: u16,
        /// Underlying socket error
        source: io::Error,
    },

    /// `start()` called while the server is already listening
    AlreadyRunning,

    /// `start()` called after `stop()`
    AlreadyStopped,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Listen { port, source } => {
                write!(f, "Failed to listen on port {}: {}", port, source)
            }
            Error::AlreadyRunning => write!(f, "Server is already running"),
            Error::AlreadyStopped => write!(f, "Server has been stopped"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Listen { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Reasons a request is answered with 400 Bad Request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// Peer closed before sending anything
    Empty,

    /// More than the header cap arrived without finishing the request
    TooLarge(usize),

    /// No `\r\n` after the request line
    MissingLineTerminator,

    /// Request line lacks a method, target or version
    MalformedRequestLine,

    /// Request line is not valid UTF-8
    InvalidEncoding,

    /// Method other than GET
    MethodNotAllowed,

    /// Empty path, path not starting with `/`, or path containing `..`
    UnsafePath,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Empty => write!(f, "Empty request"),
            RequestError::TooLarge(size) => {
                write!(f, "Request too large: {} bytes (max 8192)", size)
            }
            RequestError::MissingLineTerminator => write!(f, "Request line not terminated"),
            RequestError::MalformedRequestLine => write!(f, "Malformed request line"),
            RequestError::InvalidEncoding => write!(f, "Request line is not UTF-8"),
            RequestError::MethodNotAllowed => write!(f, "Only GET supported"),
            RequestError::UnsafePath => write!(f, "Unsafe or empty path"),
        }
    }
}

impl std::error::Error for RequestError {}
