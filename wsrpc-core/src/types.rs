//! Wire types exchanged on a wsrpc connection
//!
//! Three message shapes travel over the wire:
//!
//! 1. **Request**: inbound call naming a method, carrying an id and params
//! 2. **Response**: outbound answer echoing the id with a result or an error
//! 3. **Event**: outbound, unsolicited, never acknowledged
//!
//! Field presence is part of the contract. A response carries exactly one of
//! `result` and `error`, and the other key is left out rather than written as
//! `null`. An event has no id and no error.
//!
//! ```text
//! Request:  {"jsonrpc":"2.0","id":1,"method":"echo","params":{"msg":"hi"}}
//! Response: {"jsonrpc":"2.0","id":1,"result":{"msg":"hi"}}
//!           {"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"..."}}
//! Event:    {"event":"tick","data":{"n":3}}
//! ```

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version tag written on every response
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier
///
/// Opaque to the server: it is only ever echoed back, so any JSON value the
/// peer sends is kept as-is. Serialized untagged so the wire form is the bare
/// value. Only `null` and the empty string fail to identify a call.
///
/// ```rust
/// use wsrpc_core::Id;
///
/// let id: Id = 7i64.into();
/// assert_eq!(id.to_string(), "7");
/// assert!(!Id::String(String::new()).is_present());
///
/// let big: Id = serde_json::from_str("18446744073709551615").unwrap();
/// assert_eq!(big.to_string(), "18446744073709551615");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// String identifier
    String(String),
    /// Numeric identifier of any range or precision JSON numbers carry
    Number(serde_json::Number),
    /// Placeholder echoed when the request id is unknown
    Null,
    /// Any other JSON value (object, array, boolean), echoed verbatim
    Other(serde_json::Value),
}

impl Id {
    /// Whether the id can correlate a call: non-null and not an empty string
    pub fn is_present(&self) -> bool {
        match self {
            Id::String(s) => !s.is_empty(),
            Id::Number(_) | Id::Other(_) => true,
            Id::Null => false,
        }
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::Null
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
            Id::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n.into())
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n.into())
    }
}

impl From<serde_json::Value> for Id {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Id::String(s),
            serde_json::Value::Number(n) => Id::Number(n),
            serde_json::Value::Null => Id::Null,
            other => Id::Other(other),
        }
    }
}

/// Inbound request
///
/// Decoding is lenient about missing fields so that validation, not
/// parsing, reports them: a missing `method` decodes as an empty string and a
/// missing or `null` id decodes as `None`. Both `params: null` and an absent
/// `params` decode as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version tag as sent by the peer
    #[serde(default)]
    pub jsonrpc: String,

    /// Caller-supplied id; its presence distinguishes a call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,

    /// Method name
    #[serde(default)]
    pub method: String,

    /// Opaque params, decoded by the handler wrapper
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a request tagged with the current protocol version
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// The id if it can correlate a call
    pub fn present_id(&self) -> Option<&Id> {
        self.id.as_ref().filter(|id| id.is_present())
    }

    /// Method non-empty and id present
    pub fn is_valid(&self) -> bool {
        !self.method.is_empty() && self.present_id().is_some()
    }
}

/// Outbound response
///
/// Built only through [`Response::success`] and [`Response::failure`], so
/// exactly one of `result` and `error` is set.
///
/// ```rust
/// use wsrpc_core::{Id, Response, RpcError};
/// use serde_json::json;
///
/// let ok = Response::success(Id::from(1i64), json!({"msg": "hi"}));
/// assert_eq!(
///     serde_json::to_string(&ok).unwrap(),
///     r#"{"jsonrpc":"2.0","id":1,"result":{"msg":"hi"}}"#
/// );
///
/// let failed = Response::failure(Id::from(2i64), RpcError::method_not_found("nope"));
/// assert!(!serde_json::to_string(&failed).unwrap().contains("result"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always "2.0"
    pub jsonrpc: String,

    /// Echoed request id, `null` when it could not be determined
    pub id: Id,

    /// Present only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Present only on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Successful response carrying `result`
    pub fn success(id: Id, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response carrying `error`
    pub fn failure(id: Id, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Unsolicited event pushed to one or more peers
///
/// `data` is left out of the wire form when absent or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub event: String,

    /// Event payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    /// Create an event from an already-encoded payload
    pub fn new(event: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            event: event.into(),
            data: data.filter(|d| !d.is_null()),
        }
    }

    /// Create an event from any serializable payload
    pub fn with_data<T: Serialize + ?Sized>(
        event: impl Into<String>,
        data: &T,
    ) -> crate::Result<Self> {
        let value = serde_json::to_value(data)?;
        Ok(Self::new(event, Some(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_display() {
        assert_eq!(Id::String("test".to_string()).to_string(), "\"test\"");
        assert_eq!(Id::from(42i64).to_string(), "42");
        assert_eq!(Id::Null.to_string(), "null");
        assert_eq!(Id::from(json!({"k": 1})).to_string(), r#"{"k":1}"#);
    }

    #[test]
    fn test_id_accepts_any_json_value() {
        let cases = [
            (json!(18446744073709551615u64), "18446744073709551615"),
            (json!(-3), "-3"),
            (json!(1.5), "1.5"),
            (json!({"k": 1}), r#"{"k":1}"#),
            (json!([1, "a"]), r#"[1,"a"]"#),
            (json!(true), "true"),
        ];

        for (raw, wire) in cases {
            let id: Id = serde_json::from_value(raw.clone()).unwrap();
            assert!(id.is_present());
            assert_eq!(id, Id::from(raw));
            assert_eq!(serde_json::to_string(&id).unwrap(), wire);
        }
    }

    #[test]
    fn test_id_presence() {
        assert!(Id::from(0i64).is_present());
        assert!(Id::from(json!({})).is_present());
        assert!(Id::from("abc").is_present());
        assert!(!Id::from("").is_present());
        assert!(!Id::Null.is_present());
    }

    #[test]
    fn test_request_missing_fields_decode_leniently() {
        let req: Request = serde_json::from_str(r#"{"jsonrpc":"2.0"}"#).unwrap();
        assert!(req.method.is_empty());
        assert!(req.id.is_none());
        assert!(req.params.is_none());
        assert!(!req.is_valid());
    }

    #[test]
    fn test_request_null_id_and_params_are_absent() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"m","params":null}"#)
                .unwrap();
        assert!(req.id.is_none());
        assert!(req.params.is_none());
        assert!(!req.is_valid());
    }

    #[test]
    fn test_request_empty_string_id_is_invalid() {
        let req: Request = serde_json::from_str(r#"{"id":"","method":"m"}"#).unwrap();
        assert_eq!(req.id, Some(Id::String(String::new())));
        assert!(req.present_id().is_none());
        assert!(!req.is_valid());
    }

    #[test]
    fn test_request_new_is_valid() {
        let req = Request::new("echo", Some(json!({"msg": "hi"})), Id::from(1i64));
        assert_eq!(req.jsonrpc, "2.0");
        assert!(req.is_valid());
    }

    #[test]
    fn test_error_response_omits_result() {
        let resp = Response::failure(Id::from(1i64), RpcError::internal_error("boom"));
        let value = serde_json::to_value(&resp).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("result"));
        assert_eq!(object["error"]["code"], -32603);
        assert!(resp.is_error());
    }

    #[test]
    fn test_null_result_is_still_written() {
        let resp = Response::success(Id::from(1i64), serde_json::Value::Null);
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":1,"result":null}"#);
        assert!(resp.is_success());
    }

    #[test]
    fn test_unknown_id_echoes_null() {
        let resp = Response::failure(Id::Null, RpcError::parse_error("eof"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""id":null"#));
    }

    #[test]
    fn test_event_shape() {
        let event = Event::with_data("tick", &json!({"n": 3})).unwrap();
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"event":"tick","data":{"n":3}}"#
        );

        let bare = Event::new("ping", Some(serde_json::Value::Null));
        assert_eq!(serde_json::to_string(&bare).unwrap(), r#"{"event":"ping"}"#);
    }
}
