//! Per-connection serve loop
//!
//! One loop per connection, strictly sequential: request N+1 is not read
//! until the response to request N has been written, so responses leave in
//! the order requests arrived.
//!
//! # States
//!
//! - **Reading**: wait for the next message, dispatch it, write the response
//! - **Terminated**: a read, encode or write failed, or the token was
//!   cancelled; the error is returned and the caller owns teardown
//!
//! Malformed or unknown requests never end the loop; they are answered with
//! an error response like any other request.

use crate::dispatcher::dispatch_labeled;
use crate::metrics::ServerMetrics;
use crate::registry::MethodRegistry;
use crate::transport::Transport;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use wsrpc_core::{codec, Error, Result};

/// Serve requests on `conn` until it fails or `cancel` fires
///
/// Returns the error that ended the loop: `Error::ConnectionClosed` when the
/// peer closed, `Error::Cancelled` on cancellation, or the transport's error.
/// Failures are not retried.
pub async fn serve<C>(registry: &MethodRegistry, conn: &C, cancel: &CancellationToken) -> Result<()>
where
    C: Transport + ?Sized,
{
    serve_instrumented(registry, conn, cancel, None).await
}

#[tracing::instrument(name = "connection.serve", skip_all, fields(conn_id = conn.id()))]
pub(crate) async fn serve_instrumented<C>(
    registry: &MethodRegistry,
    conn: &C,
    cancel: &CancellationToken,
    metrics: Option<&ServerMetrics>,
) -> Result<()>
where
    C: Transport + ?Sized,
{
    tracing::debug!("Serving connection");

    let result = serve_loop(registry, conn, cancel, metrics).await;

    match &result {
        Err(Error::ConnectionClosed) => tracing::info!("Connection closed by peer"),
        Err(Error::Cancelled) => tracing::info!("Connection serve cancelled"),
        Err(e) => tracing::error!(error = %e, "Connection terminated"),
        Ok(()) => {}
    }
    if let (Some(m), Err(e)) = (metrics, &result) {
        m.record_error(e);
    }

    result
}

async fn serve_loop<C>(
    registry: &MethodRegistry,
    conn: &C,
    cancel: &CancellationToken,
    metrics: Option<&ServerMetrics>,
) -> Result<()>
where
    C: Transport + ?Sized,
{
    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            msg = conn.read_message() => msg?,
        };

        let start = Instant::now();
        let (response, label) = dispatch_labeled(registry, &raw, conn.id(), cancel).await;

        if let Some(m) = metrics {
            let status = if response.is_success() { "success" } else { "error" };
            m.record_request(label.as_str(), status, start.elapsed().as_secs_f64());
        }

        let text = codec::encode_response(&response)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            written = conn.write_message(&text) => written?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wsrpc_core::RpcError;

    /// Transport fed from a script, recording everything written
    struct Scripted {
        inbound: Mutex<VecDeque<Result<Vec<u8>>>>,
        written: Mutex<Vec<String>>,
        fail_writes: bool,
    }

    impl Scripted {
        fn new(frames: Vec<&str>, end: Error) -> Self {
            let mut inbound: VecDeque<Result<Vec<u8>>> =
                frames.into_iter().map(|f| Ok(f.as_bytes().to_vec())).collect();
            inbound.push_back(Err(end));
            Self {
                inbound: Mutex::new(inbound),
                written: Mutex::new(Vec::new()),
                fail_writes: false,
            }
        }

        fn written(&self) -> Vec<serde_json::Value> {
            self.written
                .lock()
                .unwrap()
                .iter()
                .map(|s| serde_json::from_str(s).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        fn id(&self) -> u64 {
            11
        }

        async fn read_message(&self) -> Result<Vec<u8>> {
            let next = self.inbound.lock().unwrap().pop_front();
            match next {
                Some(frame) => frame,
                None => std::future::pending().await,
            }
        }

        async fn write_message(&self, text: &str) -> Result<()> {
            if self.fail_writes {
                return Err(Error::WebSocket("broken pipe".into()));
            }
            self.written.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Deserialize)]
    struct N {
        n: i64,
    }

    fn registry() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        registry
            .register("double", |_ctx, p: N| async move { Ok::<_, RpcError>(p.n * 2) })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_responses_in_request_order_and_bad_frames_keep_loop_alive() {
        let conn = Scripted::new(
            vec![
                r#"{"jsonrpc":"2.0","id":1,"method":"double","params":{"n":1}}"#,
                "garbage",
                r#"{"jsonrpc":"2.0","id":2,"method":"missing"}"#,
                r#"{"jsonrpc":"2.0","id":3,"method":"double","params":{"n":21}}"#,
            ],
            Error::ConnectionClosed,
        );

        let result = serve(&registry(), &conn, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));

        let written = conn.written();
        assert_eq!(written.len(), 4);
        assert_eq!(written[0]["result"], 2);
        assert_eq!(written[1]["error"]["code"], -32700);
        assert_eq!(written[2]["error"]["code"], -32601);
        assert_eq!(written[3]["id"], 3);
        assert_eq!(written[3]["result"], 42);
    }

    #[tokio::test]
    async fn test_read_failure_is_propagated() {
        let conn = Scripted::new(vec![], Error::WebSocket("reset".into()));
        let result = serve(&registry(), &conn, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::WebSocket(_))));
    }

    #[tokio::test]
    async fn test_write_failure_terminates() {
        let mut conn = Scripted::new(
            vec![r#"{"jsonrpc":"2.0","id":1,"method":"double","params":{"n":1}}"#],
            Error::ConnectionClosed,
        );
        conn.fail_writes = true;

        let result = serve(&registry(), &conn, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::WebSocket(ref m)) if m == "broken pipe"));
        // The closing read was never reached
        assert_eq!(conn.inbound.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_read() {
        let conn = Scripted {
            inbound: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            fail_writes: false,
        };
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            serve(&registry(), &conn, &cancel),
        )
        .await
        .expect("serve should stop promptly");

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_instrumented_serve_records_and_answers() {
        let metrics = ServerMetrics::new("wsrpc-test");
        let conn = Scripted::new(
            vec![
                r#"{"jsonrpc":"2.0","id":1,"method":"double","params":{"n":4}}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"absent"}"#,
            ],
            Error::ConnectionClosed,
        );

        let result =
            serve_instrumented(&registry(), &conn, &CancellationToken::new(), Some(&metrics)).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));

        let written = conn.written();
        assert_eq!(written[0]["result"], 8);
        assert_eq!(written[1]["error"]["code"], -32601);
    }
}
