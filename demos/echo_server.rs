//! Echo server demo
//!
//! Serves `echo` and `fail`, and broadcasts a `tick` event to every client
//! once per second.
//!
//! Run with: cargo run --example echo_server
//! Override the address with BIND_ADDRESS (default 127.0.0.1:9000).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use wsrpc_core::{RpcError, TelemetryConfig};
use wsrpc_server::{RequestContext, WsRpcServer};

#[derive(Deserialize, Serialize)]
struct EchoParams {
    msg: String,
}

#[derive(Deserialize)]
struct FailParams {}

async fn echo_handler(ctx: RequestContext, params: EchoParams) -> Result<EchoParams, RpcError> {
    tracing::info!(conn_id = ctx.conn_id, msg = %params.msg, "Echoing");
    Ok(params)
}

async fn fail_handler(_ctx: RequestContext, _params: FailParams) -> Result<(), RpcError> {
    Err(RpcError::new(1001, "quota exceeded"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:9000".to_string());

    let server = WsRpcServer::builder()
        .bind_str(&addr)?
        .handler("echo", echo_handler)
        .handler("fail", fail_handler)
        .with_observability(TelemetryConfig::logs_only("echo-server"))
        .build()
        .await?;
    let server = Arc::new(server);

    println!("Echo server running on ws://{}", server.local_addr()?);
    println!("Try: {{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"echo\",\"params\":{{\"msg\":\"hi\"}}}}");

    let ticker = Arc::clone(&server);
    tokio::spawn(async move {
        let shutdown = ticker.shutdown_token();
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut n: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            n += 1;
            match ticker.broadcast("tick", &serde_json::json!({ "n": n })).await {
                Ok(results) => {
                    let outcomes = results.collect().await;
                    let failed = outcomes.iter().filter(|o| !o.is_delivered()).count();
                    tracing::debug!(n, targets = outcomes.len(), failed, "Tick broadcast");
                }
                Err(e) => tracing::error!(error = %e, "Tick broadcast failed"),
            }
        }
    });

    let runner = Arc::clone(&server);
    let run = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    println!("Shutting down");
    server.shutdown();
    run.await??;

    wsrpc_core::shutdown_telemetry();
    Ok(())
}
