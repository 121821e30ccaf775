//! Wire types, error taxonomy and codec for wsrpc
//!
//! This crate holds everything about wsrpc that does not depend on a
//! transport:
//!
//! - **Types**: request, response and event frames with their field presence rules
//! - **Error**: the fixed error-code taxonomy, the wire error object and the
//!   classification trait handlers use to report domain errors
//! - **Codec**: frame encoding/decoding with best-effort id recovery
//! - **Telemetry**: `tracing` subscriber and OpenTelemetry bootstrap
//!
//! `wsrpc-server` builds the registry, dispatcher, serve loop and broadcast
//! on top of these.
//!
//! # Example
//!
//! ```rust
//! use wsrpc_core::{codec, Id, Response, RpcError};
//!
//! let req = codec::decode_request(br#"{"jsonrpc":"2.0","id":2,"method":"nope"}"#).unwrap();
//! let resp = Response::failure(req.id.unwrap_or(Id::Null), RpcError::method_not_found(&req.method));
//!
//! let json = codec::encode_response(&resp).unwrap();
//! assert!(json.contains("-32601"));
//! ```

pub mod codec;
pub mod error;
pub mod telemetry;
pub mod types;

pub use error::{Error, IntoRpcError, Result, RpcError};
pub use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
pub use types::{Event, Id, Request, Response, JSONRPC_VERSION};
