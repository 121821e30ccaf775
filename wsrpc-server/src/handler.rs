//! Handler trait and the typed-handler wrapper
//!
//! The registry stores every method behind the same object-safe [`Handler`]
//! trait, which works on untyped JSON params. [`from_typed_fn`] is the bridge
//! from a strongly-typed async function to that trait: it is called once per
//! registration and produces a wrapper that, on every call,
//!
//! 1. normalizes absent or `null` params to `{}`
//! 2. decodes them into the function's parameter type (`-32602` on failure,
//!    carrying the decoder's message)
//! 3. runs the function with the call's [`RequestContext`]
//! 4. classifies an error through [`IntoRpcError`]
//! 5. converts a success into a JSON value
//!
//! # Examples
//!
//! ```rust
//! use wsrpc_server::{from_typed_fn, RequestContext};
//! use wsrpc_core::RpcError;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct EchoParams { msg: String }
//!
//! #[derive(Serialize)]
//! struct EchoResult { msg: String }
//!
//! let handler = from_typed_fn(|_ctx: RequestContext, p: EchoParams| async move {
//!     Ok::<_, RpcError>(EchoResult { msg: p.msg })
//! });
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wsrpc_core::{Id, IntoRpcError, RpcError};

use crate::transport::ConnectionId;

/// Boxed future returned by every [`Handler`]
///
/// Boxing gives handlers with different concrete futures one type to store
/// in the registry.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;

/// Per-call context handed to handlers
///
/// `cancel` is a child of the connection's cancellation token: it fires when
/// the serve loop is cancelled. The dispatcher never imposes a timeout of
/// its own; handlers that do long work should watch this token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Connection the request arrived on
    pub conn_id: ConnectionId,
    /// Id of the request being served
    pub id: Id,
    /// Method name the request was routed by
    pub method: String,
    /// Cancellation for this call
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(conn_id: ConnectionId, id: Id, method: impl Into<String>) -> Self {
        Self {
            conn_id,
            id,
            method: method.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Type-erased method handler
///
/// Implemented by [`TypedHandler`]; implement it directly only when a method
/// needs to look at the raw params itself.
pub trait Handler: Send + Sync {
    /// Handle one call
    ///
    /// `params` is the request's params as sent, `None` when absent or `null`.
    fn call(&self, ctx: RequestContext, params: Option<Value>) -> HandlerFuture;
}

/// Wrapper adapting a typed async function into a [`Handler`]
///
/// Built through [`from_typed_fn`]. `P`, `R` and `E` only appear in the
/// function's signature, hence the `PhantomData`.
pub struct TypedHandler<P, R, E, F> {
    func: Arc<F>,
    _types: PhantomData<fn(P) -> Result<R, E>>,
}

impl<P, R, E, F, Fut> Handler for TypedHandler<P, R, E, F>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: IntoRpcError + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, params: Option<Value>) -> HandlerFuture {
        let func = Arc::clone(&self.func);

        Box::pin(async move {
            let params: P = decode_params(params)?;

            let result = func(ctx, params).await.map_err(IntoRpcError::into_rpc_error)?;

            serde_json::to_value(result).map_err(|e| {
                RpcError::internal_error(format!("failed to encode result: {}", e))
            })
        })
    }
}

/// Decode params into `P`, treating absent and `null` as an empty object
fn decode_params<P: DeserializeOwned>(params: Option<Value>) -> Result<P, RpcError> {
    let params = match params {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value,
    };

    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Build the type-erased wrapper for a typed handler function
///
/// The function receives the call's [`RequestContext`] and the decoded params
/// and returns `Result<R, E>` where `E` is any [`IntoRpcError`]: return an
/// `RpcError` (or `wsrpc_core::Error::JsonRpc`) for a domain code, or any
/// other `wsrpc_core::Error` to report an internal error.
///
/// Methods that take no params should use a struct with no required fields;
/// the empty-object normalization means a missing `params` decodes into it.
pub fn from_typed_fn<P, R, E, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: IntoRpcError + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Box::new(TypedHandler {
        func: Arc::new(func),
        _types: PhantomData,
    })
}
