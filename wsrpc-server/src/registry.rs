//! Method registry
//!
//! Maps method names to type-erased handlers. The registry is filled once
//! while the server is being built and then only read: the serve loop of
//! every connection borrows it, so no locking is needed while serving.
//!
//! # Registration Rules
//!
//! - Method names are unique. Registering a name twice fails with
//!   `Error::DuplicateMethod` and keeps the first handler.
//! - Empty names are rejected, since no valid request can reach them.
//!
//! # Examples
//!
//! ```rust
//! use wsrpc_server::{MethodRegistry, RequestContext};
//! use wsrpc_core::{Error, RpcError};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Ping {}
//!
//! let mut registry = MethodRegistry::new();
//! registry
//!     .register("ping", |_ctx: RequestContext, _: Ping| async { Ok::<_, RpcError>("pong") })
//!     .unwrap();
//!
//! let again = registry.register("ping", |_ctx: RequestContext, _: Ping| async {
//!     Ok::<_, RpcError>("pong")
//! });
//! assert!(matches!(again, Err(Error::DuplicateMethod(_))));
//! ```

use crate::handler::{from_typed_fn, Handler, RequestContext};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use wsrpc_core::{Error, IntoRpcError, Result};

/// Registry of method handlers
///
/// Cloning is cheap: the map lives behind an `Arc` and handlers are shared.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    handlers: Arc<HashMap<String, Arc<dyn Handler>>>,
}

impl MethodRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler function under `method`
    ///
    /// The wrapper that decodes params and classifies errors is built here,
    /// once, not per request.
    pub fn register<P, R, E, F, Fut>(&mut self, method: impl Into<String>, func: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: IntoRpcError + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.register_handler(method, from_typed_fn(func))
    }

    /// Register an already type-erased handler under `method`
    pub fn register_handler(
        &mut self,
        method: impl Into<String>,
        handler: Box<dyn Handler>,
    ) -> Result<()> {
        let method = method.into();

        if method.is_empty() {
            return Err(Error::Config("method name must not be empty".to_string()));
        }
        if self.handlers.contains_key(&method) {
            return Err(Error::DuplicateMethod(method));
        }

        tracing::debug!(method = %method, "Registered method");
        Arc::make_mut(&mut self.handlers).insert(method, Arc::from(handler));
        Ok(())
    }

    /// Handler registered under `method`
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wsrpc_core::{Id, RpcError};

    #[derive(Deserialize)]
    struct Empty {}

    #[tokio::test]
    async fn test_register_and_call() {
        let mut registry = MethodRegistry::new();
        registry
            .register("status", |_ctx, _: Empty| async { Ok::<_, RpcError>("ok") })
            .unwrap();

        assert!(registry.has_method("status"));
        assert!(!registry.has_method("unknown"));

        let handler = registry.get("status").unwrap();
        let ctx = RequestContext::new(0, Id::from(1i64), "status");
        assert_eq!(handler.call(ctx, None).await.unwrap(), serde_json::json!("ok"));
    }

    #[test]
    fn test_duplicate_rejected_and_first_kept() {
        let mut registry = MethodRegistry::new();
        registry
            .register("a", |_ctx, _: Empty| async { Ok::<_, RpcError>(1) })
            .unwrap();

        let err = registry
            .register("a", |_ctx, _: Empty| async { Ok::<_, RpcError>(2) })
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateMethod(ref m) if m == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = MethodRegistry::new();
        let err = registry
            .register("", |_ctx, _: Empty| async { Ok::<_, RpcError>(()) })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_methods_sorted() {
        let mut registry = MethodRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(name, |_ctx, _: Empty| async { Ok::<_, RpcError>(()) })
                .unwrap();
        }
        assert_eq!(registry.methods(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_clone_shares_handlers() {
        let mut registry = MethodRegistry::new();
        registry
            .register("x", |_ctx, _: Empty| async { Ok::<_, RpcError>(()) })
            .unwrap();

        let clone = registry.clone();
        assert!(clone.has_method("x"));
    }
}
