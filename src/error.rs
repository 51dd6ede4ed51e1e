//! Error types for rpcwire.
//!
//! Envelope-level failures live in [`crate::protocol::EnvelopeError`] and
//! [`crate::protocol::ErrorResponse`]; this module holds the crate-wide
//! [`RpcError`], the payload-level [`Fault`] and the codec error.

use thiserror::Error;

use crate::protocol::{EnvelopeError, ErrorResponse};

/// Fault code for a failure the method reported without a code of its own,
/// and for failures nobody could categorize.
pub const APPLICATION_ERROR: i32 = -32500;

/// Fault code for a call naming a method the dispatcher does not know.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Fault code for a request payload the codec could not decode.
pub const PARSE_ERROR: i32 = -32700;

/// Application-level error reported inside a well-formed response payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fault {code}: {message}")]
pub struct Fault {
    /// Numeric fault code.
    pub code: i32,
    /// Human readable description.
    pub message: String,
}

impl Fault {
    /// Create a fault with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Fault for a generic runtime failure.
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(APPLICATION_ERROR, message)
    }

    /// Fault for an unregistered method name.
    pub fn method_not_found(name: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method '{}' not found", name))
    }

    /// Opaque fault used when the failure carries no usable information.
    pub fn unknown() -> Self {
        Self::new(APPLICATION_ERROR, "Unknown Error")
    }
}

/// Payload codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload was well-formed but not a valid call or response document.
    #[error("Invalid payload: {0}")]
    Invalid(String),
}

/// Main error type for rpcwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Received bytes did not form a valid HTTP envelope.
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Peer answered with a non-success HTTP status.
    #[error(transparent)]
    Http(#[from] ErrorResponse),

    /// Peer answered with an application-level fault.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Connection closed before a complete packet arrived.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// HTTP status and phrase, if this is an envelope-level rejection from the peer.
    pub fn status(&self) -> Option<(u16, &str)> {
        match self {
            RpcError::Http(resp) => Some((resp.status(), resp.phrase())),
            _ => None,
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
