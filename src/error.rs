//! # Error Types
//!
//! Error handling for the Nemoria store, its persistence layer and the wire protocol.
//!
//! Every failure in the crate is a [`NemoriaError`]. Each variant belongs to one
//! stable [`ErrorKind`], which is what travels over the wire inside an
//! [`ErrorDescriptor`] when the server reports a failed request.
//!
//! ## Error Categories
//! - **Route errors**: empty or malformed routes, missing targets, conflicts
//! - **Authentication**: namespace/password mismatch during the handshake
//! - **Persistence**: unknown codec names, file I/O and decode failures
//! - **Protocol errors**: bad framing, unexpected messages, timeouts, closed streams
//!
//! Protocol errors are always fatal to the connection they occur on, because the
//! byte stream can no longer be trusted.
//!
//! ## Example Usage
//! ```rust
//! use nemoria::error::{ErrorKind, NemoriaError, Result};
//! use nemoria::store::Route;
//!
//! fn parse(raw: &str) -> Result<Route> {
//!     raw.parse::<Route>()
//! }
//!
//! match parse("") {
//!     Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidRoute),
//!     Ok(_) => unreachable!(),
//! }
//! # let _ = NemoriaError::AuthenticationFailed;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Route validation
    pub const ERR_EMPTY_ROUTE: &str = "Route must contain at least one segment";
    pub const ERR_EMPTY_SEGMENT: &str = "Route segments must not be empty";

    /// Store
    pub const ERR_STORE_READ_LOCK: &str = "Failed to acquire read lock on store";
    pub const ERR_STORE_WRITE_LOCK: &str = "Failed to acquire write lock on store";
    pub const ERR_SNAPSHOT_NOT_MAP: &str = "Snapshot root must be a mapping";
    pub const ERR_TOO_DEEP: &str = "Nesting exceeds the store depth limit";

    /// Persistence
    pub const ERR_NON_FINITE_FLOAT: &str = "JSON cannot represent NaN or infinite numbers";

    /// Protocol negotiation errors
    pub const ERR_EXPECTED_HELLO: &str = "Expected server hello";
    pub const ERR_EXPECTED_AUTH: &str = "Expected authentication frame";
    pub const ERR_EXPECTED_AUTH_RESULT: &str = "Expected authentication result";
    pub const ERR_EXPECTED_REQUEST: &str = "Expected request frame";
    pub const ERR_EXPECTED_RESPONSE: &str = "Expected response frame";
    pub const ERR_REPLY_MISMATCH: &str = "Reply does not match request";
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// Stable error category carried in `ERROR` response frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRoute,
    RouteNotFound,
    RouteConflict,
    AuthenticationFailed,
    UnsupportedCodec,
    PersistenceError,
    ProtocolError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRoute => "InvalidRoute",
            ErrorKind::RouteNotFound => "RouteNotFound",
            ErrorKind::RouteConflict => "RouteConflict",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::UnsupportedCodec => "UnsupportedCodec",
            ErrorKind::PersistenceError => "PersistenceError",
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error as transmitted in a `Response::Error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

// NemoriaError is the primary error type for every operation in the crate
#[derive(Error, Debug)]
pub enum NemoriaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Route conflict: {0}")]
    RouteConflict(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Protocol error: {0}")]
    ProtocolViolation(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Client is not connected")]
    NotConnected,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NemoriaError {
    /// The wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NemoriaError::InvalidRoute(_) => ErrorKind::InvalidRoute,
            NemoriaError::RouteNotFound(_) => ErrorKind::RouteNotFound,
            NemoriaError::RouteConflict(_) => ErrorKind::RouteConflict,
            NemoriaError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            NemoriaError::UnsupportedCodec(_) => ErrorKind::UnsupportedCodec,
            NemoriaError::PersistenceError(_) | NemoriaError::Io(_) => ErrorKind::PersistenceError,
            NemoriaError::Serialization(_)
            | NemoriaError::InvalidHeader
            | NemoriaError::UnsupportedVersion(_)
            | NemoriaError::OversizedPacket(_)
            | NemoriaError::UnexpectedMessage(_)
            | NemoriaError::ProtocolViolation(_)
            | NemoriaError::ConnectionClosed
            | NemoriaError::NotConnected
            | NemoriaError::Timeout => ErrorKind::ProtocolError,
            NemoriaError::ConfigError(_) | NemoriaError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the connection this error happened on must be closed.
    pub fn is_fatal_to_connection(&self) -> bool {
        self.kind() == ErrorKind::ProtocolError
    }

    /// Build the descriptor sent back to a client.
    pub fn to_descriptor(&self) -> ErrorDescriptor {
        let message = match self {
            NemoriaError::InvalidRoute(m)
            | NemoriaError::RouteNotFound(m)
            | NemoriaError::RouteConflict(m)
            | NemoriaError::UnsupportedCodec(m)
            | NemoriaError::PersistenceError(m)
            | NemoriaError::ProtocolViolation(m)
            | NemoriaError::Internal(m) => m.clone(),
            other => other.to_string(),
        };
        ErrorDescriptor {
            kind: self.kind(),
            message,
        }
    }

    /// Rebuild a local error from a descriptor received over the wire.
    pub fn from_descriptor(descriptor: ErrorDescriptor) -> Self {
        let ErrorDescriptor { kind, message } = descriptor;
        match kind {
            ErrorKind::InvalidRoute => NemoriaError::InvalidRoute(message),
            ErrorKind::RouteNotFound => NemoriaError::RouteNotFound(message),
            ErrorKind::RouteConflict => NemoriaError::RouteConflict(message),
            ErrorKind::AuthenticationFailed => NemoriaError::AuthenticationFailed,
            ErrorKind::UnsupportedCodec => NemoriaError::UnsupportedCodec(message),
            ErrorKind::PersistenceError => NemoriaError::PersistenceError(message),
            ErrorKind::ProtocolError => NemoriaError::ProtocolViolation(message),
            ErrorKind::Internal => NemoriaError::Internal(message),
        }
    }
}

/// Type alias for Results using NemoriaError
pub type Result<T> = std::result::Result<T, NemoriaError>;
