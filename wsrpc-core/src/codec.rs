//! Encoding and decoding of wsrpc frames
//!
//! Thin wrappers over serde_json that map failures onto the crate's error
//! types:
//!
//! - encoding failures become `Error::Serialization`
//! - a frame that is not a request becomes a `-32700` parse error carrying
//!   the decoder's own message
//!
//! When a frame fails to decode, [`extract_id`] still tries to recover the
//! caller's id so the parse error can be correlated. This is best effort: a
//! frame that is not even a JSON object yields no id.
//!
//! ```rust
//! use wsrpc_core::{codec, Id};
//!
//! let raw = br#"{"jsonrpc":"2.0","id":9,"method":5}"#;
//! assert!(codec::decode_request(raw).is_err());
//! assert_eq!(codec::extract_id(raw), Some(Id::from(9i64)));
//! ```

use crate::error::{Error, Result, RpcError};
use crate::types::{Event, Id, Request, Response};
use serde::Serialize;

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize + ?Sized>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a response frame
pub fn encode_response(resp: &Response) -> Result<String> {
    encode(resp)
}

/// Encode an event frame
pub fn encode_event(event: &Event) -> Result<String> {
    encode(event)
}

/// Decode an inbound frame as a request
///
/// Returns `Error::JsonRpc` holding a parse error on failure, so callers that
/// only need the wire error can classify it directly.
pub fn decode_request(raw: &[u8]) -> Result<Request> {
    serde_json::from_slice(raw).map_err(|e| Error::JsonRpc(RpcError::parse_error(e.to_string())))
}

/// Best-effort recovery of the id from a frame that failed to decode
///
/// Any present id is recovered, whatever its JSON type.
pub fn extract_id(raw: &[u8]) -> Option<Id> {
    let mut value: serde_json::Value = serde_json::from_slice(raw).ok()?;
    let id = Id::from(value.get_mut("id")?.take());
    id.is_present().then_some(id)
}
