//! Server builder for constructing WebSocket RPC servers
//!
//! The builder provides a fluent API for configuring and creating a
//! [`WsRpcServer`]. It allows you to:
//! - Set the bind address
//! - Register typed method handlers
//! - Enable observability
//!
//! Registration errors (a duplicate or empty method name) do not break the
//! chain. The first one is kept and returned from [`ServerBuilder::build`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use wsrpc_server::{RequestContext, WsRpcServer};
//! use wsrpc_core::RpcError;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, Serialize)]
//! struct Echo { msg: String }
//!
//! # async fn example() -> wsrpc_core::Result<()> {
//! let server = WsRpcServer::builder()
//!     .bind_str("127.0.0.1:8080")?
//!     .handler("echo", |_ctx: RequestContext, p: Echo| async move { Ok::<_, RpcError>(p) })
//!     .with_default_observability()
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::handler::RequestContext;
use crate::{MethodRegistry, ServerMetrics, WsRpcServer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wsrpc_core::{Error, IntoRpcError, Result, TelemetryConfig};

/// Builder for constructing a [`WsRpcServer`]
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    registry: MethodRegistry,
    registration_error: Option<Error>,
    telemetry_config: Option<TelemetryConfig>,
    service_name: Option<String>,
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            addr: None,
            registry: MethodRegistry::new(),
            registration_error: None,
            telemetry_config: None,
            service_name: None,
        }
    }

    /// Set the bind address for the server
    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Set the bind address from a string (e.g., "127.0.0.1:8080")
    pub fn bind_str(mut self, addr: &str) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address {}: {}", addr, e)))?;
        self.addr = Some(addr);
        Ok(self)
    }

    /// Register a typed handler for a method
    pub fn handler<P, R, E, F, Fut>(mut self, method: impl Into<String>, func: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: IntoRpcError + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        if let Err(e) = self.registry.register(method, func) {
            tracing::warn!(error = %e, "Method registration failed");
            self.registration_error.get_or_insert(e);
        }
        self
    }

    /// Set the registry (replaces any previously registered handlers)
    pub fn registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Enable telemetry and server metrics with a custom configuration
    pub fn with_observability(mut self, config: TelemetryConfig) -> Self {
        self.telemetry_config = Some(config);
        self
    }

    /// Enable telemetry and server metrics with the default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.telemetry_config = Some(TelemetryConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Bind the listener and build the server
    ///
    /// Connections are not accepted until [`WsRpcServer::run`] is called.
    pub async fn build(self) -> Result<WsRpcServer> {
        if let Some(e) = self.registration_error {
            return Err(e);
        }

        let addr = self
            .addr
            .ok_or_else(|| Error::Config("No bind address specified".to_string()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let metrics = if let Some(mut config) = self.telemetry_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }
            let service_name = config.service_name.clone();

            wsrpc_core::init_telemetry(config)
                .map_err(|e| Error::Internal(format!("Failed to initialize telemetry: {}", e)))?;

            Some(Arc::new(ServerMetrics::new(service_name)))
        } else {
            None
        };

        tracing::info!(
            addr = %listener.local_addr().map_err(Error::from)?,
            methods = ?self.registry.methods(),
            "Server listening"
        );

        Ok(WsRpcServer {
            listener,
            registry: self.registry,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_conn_id: AtomicU64::new(1),
            metrics,
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
