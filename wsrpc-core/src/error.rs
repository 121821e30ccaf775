//! Error types for wsrpc
//!
//! Two kinds of failure travel through this crate:
//!
//! - **RpcError**: the error object that goes on the wire inside a response
//! - **Error**: everything else (transport, serialization, registration),
//!   built with thiserror and returned through [`Result`]
//!
//! # Error Codes
//!
//! The fixed taxonomy shared by every wsrpc peer:
//! - `-32700`: Parse error (frame is not a request)
//! - `-32600`: Invalid request (missing method or id)
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32604`: Unimplemented
//!
//! Handlers may use any other code for domain errors.
//!
//! # Classification
//!
//! A handler's error reaches the wire through [`IntoRpcError`]. Errors that
//! already carry a structured code pass through verbatim; anything else
//! becomes an internal error with the error's text as the message.
//!
//! ```rust
//! use wsrpc_core::{Error, IntoRpcError, RpcError};
//!
//! let quota = RpcError::new(1001, "quota exceeded");
//! assert_eq!(quota.clone().into_rpc_error().code, 1001);
//!
//! let plain = Error::Internal("disk full".into()).into_rpc_error();
//! assert_eq!(plain.code, wsrpc_core::error::INTERNAL_ERROR);
//! assert!(plain.details.is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Frame could not be decoded as a request
pub const PARSE_ERROR: i32 = -32700;
/// Request is missing its method or id
pub const INVALID_REQUEST: i32 = -32600;
/// No handler is registered under the requested name
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Params could not be decoded into the handler's parameter type
pub const INVALID_PARAMS: i32 = -32602;
/// Unclassified handler failure
pub const INTERNAL_ERROR: i32 = -32603;
/// Method is known but not implemented
pub const UNIMPLEMENTED: i32 = -32604;

/// Result type for wsrpc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for wsrpc operations
///
/// Protocol-shape and dispatch problems never surface as `Error`; the
/// dispatcher turns them into error responses. What remains are failures
/// that end a connection or abort construction:
///
/// - **Transport**: WebSocket, Io, ConnectionClosed, Cancelled
/// - **Encoding**: Serialization
/// - **Construction**: DuplicateMethod, Config
/// - **Handler-side**: JsonRpc (already structured), Internal
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A structured wire error, passed through verbatim when classified
    #[error("{0}")]
    JsonRpc(#[from] RpcError),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Input/output error
    #[error("IO error: {0}")]
    Io(String),

    /// The peer closed the connection or the stream ended
    #[error("Connection closed")]
    ConnectionClosed,

    /// The ambient cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// A method name was registered twice
    #[error("duplicate registration of method {0}")]
    DuplicateMethod(String),

    /// Invalid construction-time configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Wire error object carried in the `error` field of a response
///
/// `details` is optional and omitted entirely from the serialized form when
/// absent.
///
/// ```rust
/// use wsrpc_core::RpcError;
/// use serde_json::json;
///
/// let err = RpcError::with_details(1001, "quota exceeded", json!({"limit": 10}));
/// let wire = serde_json::to_value(&err).unwrap();
/// assert_eq!(wire["details"]["limit"], 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Taxonomy code or a handler-chosen domain code
    pub code: i32,

    /// Human-readable message
    pub message: String,

    /// Optional structured details of any shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    /// Create an error with a code and message and no details
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an error carrying structured details
    pub fn with_details(code: i32, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Parse error (-32700); `msg` is the decoder's own message
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, msg)
    }

    /// Invalid request (-32600)
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    /// Method not found (-32601); the message names the method
    ///
    /// ```rust
    /// use wsrpc_core::RpcError;
    ///
    /// let err = RpcError::method_not_found("nope");
    /// assert_eq!(err.code, -32601);
    /// assert_eq!(err.message, "method nope does not exist");
    /// ```
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method {} does not exist", method))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    /// Unimplemented (-32604)
    pub fn unimplemented(method: &str) -> Self {
        Self::new(UNIMPLEMENTED, format!("method {} is not implemented", method))
    }

    /// Whether the code belongs to the fixed taxonomy
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self.code,
            PARSE_ERROR
                | INVALID_REQUEST
                | METHOD_NOT_FOUND
                | INVALID_PARAMS
                | INTERNAL_ERROR
                | UNIMPLEMENTED
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "rpc error {}: {} ({})", self.code, self.message, details),
            None => write!(f, "rpc error {}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RpcError {}

/// Conversion of a handler error into exactly one wire error
///
/// Implement this for your own error types to choose, per variant, between
/// a domain code and the internal-error fallback:
///
/// ```rust
/// use wsrpc_core::{IntoRpcError, RpcError};
///
/// enum AccountError {
///     Quota,
///     Backend(String),
/// }
///
/// impl IntoRpcError for AccountError {
///     fn into_rpc_error(self) -> RpcError {
///         match self {
///             AccountError::Quota => RpcError::new(1001, "quota exceeded"),
///             AccountError::Backend(msg) => RpcError::internal_error(msg),
///         }
///     }
/// }
/// ```
pub trait IntoRpcError {
    /// Produce the wire error for this value
    fn into_rpc_error(self) -> RpcError;
}

impl IntoRpcError for RpcError {
    fn into_rpc_error(self) -> RpcError {
        self
    }
}

impl IntoRpcError for Error {
    fn into_rpc_error(self) -> RpcError {
        match self {
            Error::JsonRpc(err) => err,
            other => RpcError::internal_error(other.to_string()),
        }
    }
}
