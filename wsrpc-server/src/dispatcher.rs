//! Single-request dispatch
//!
//! Turns one raw inbound frame into exactly one [`Response`]. Nothing that
//! can go wrong with the frame itself escapes as an error:
//!
//! | Failure | Code | Id echoed |
//! |---|---|---|
//! | frame does not decode as a request | -32700 | best effort, else `null` |
//! | empty method or missing/empty id | -32600 | if parsed, else `null` |
//! | no handler for the method | -32601 | yes |
//! | params do not decode | -32602 | yes |
//! | handler error | its own code, or -32603 | yes |

use crate::handler::RequestContext;
use crate::registry::MethodRegistry;
use crate::transport::ConnectionId;
use tokio_util::sync::CancellationToken;
use wsrpc_core::{codec, Error, Id, Response, RpcError};

/// Dispatch one raw frame against `registry`
///
/// `cancel` is the connection's token; the handler receives a child of it
/// through its [`RequestContext`].
pub async fn dispatch(
    registry: &MethodRegistry,
    raw: &[u8],
    conn_id: ConnectionId,
    cancel: &CancellationToken,
) -> Response {
    dispatch_labeled(registry, raw, conn_id, cancel).await.0
}

/// Metric label of a dispatched frame, bounded to registered method names
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodLabel {
    Method(String),
    Unknown,
    Invalid,
}

impl MethodLabel {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            MethodLabel::Method(m) => m,
            MethodLabel::Unknown => "unknown",
            MethodLabel::Invalid => "invalid",
        }
    }
}

/// [`dispatch`], also reporting which method the frame was routed to
#[tracing::instrument(level = "debug", skip(registry, raw, cancel))]
pub(crate) async fn dispatch_labeled(
    registry: &MethodRegistry,
    raw: &[u8],
    conn_id: ConnectionId,
    cancel: &CancellationToken,
) -> (Response, MethodLabel) {
    let request = match codec::decode_request(raw) {
        Ok(request) => request,
        Err(err) => {
            let id = codec::extract_id(raw).unwrap_or(Id::Null);
            let rpc_error = match err {
                Error::JsonRpc(e) => e,
                other => RpcError::parse_error(other.to_string()),
            };
            tracing::debug!(id = %id, error = %rpc_error, "Rejected undecodable frame");
            return (Response::failure(id, rpc_error), MethodLabel::Invalid);
        }
    };

    let id = match request.present_id() {
        Some(id) if !request.method.is_empty() => id.clone(),
        _ => {
            let id = request.id.clone().unwrap_or(Id::Null);
            tracing::debug!(id = %id, method = %request.method, "Rejected invalid request");
            return (
                Response::failure(id, RpcError::invalid_request("Invalid request object")),
                MethodLabel::Invalid,
            );
        }
    };

    let Some(handler) = registry.get(&request.method) else {
        tracing::debug!(id = %id, method = %request.method, "Method not found");
        return (
            Response::failure(id, RpcError::method_not_found(&request.method)),
            MethodLabel::Unknown,
        );
    };

    let ctx = RequestContext::new(conn_id, id.clone(), request.method.as_str())
        .with_cancel(cancel.child_token());

    let response = match handler.call(ctx, request.params).await {
        Ok(result) => Response::success(id, result),
        Err(err) => {
            if err.code == wsrpc_core::error::INTERNAL_ERROR {
                tracing::warn!(id = %id, method = %request.method, error = %err, "Handler failed");
            } else {
                tracing::debug!(id = %id, method = %request.method, error = %err, "Handler returned error");
            }
            Response::failure(id, err)
        }
    };

    (response, MethodLabel::Method(request.method))
}
