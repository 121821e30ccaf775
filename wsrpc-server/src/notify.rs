//! Unsolicited events: single send and concurrent broadcast
//!
//! Events are encoded once. [`send_event`] writes the frame to one connection
//! and returns that write's error directly. [`broadcast_event`] shares the
//! same encoded frame across every target and writes to each one in its own
//! task, so a slow or failing peer never holds up the others.
//!
//! # Broadcast Outcomes
//!
//! Every target reports exactly one [`SendOutcome`], even when its transport
//! panics mid-write (reported as `Error::Internal`). A supervisor task joins
//! all the write tasks and only then drops the channel sender, so the
//! [`BroadcastResults`] stream ends after the last outcome and never before.
//! Outcomes arrive in completion order, not target order.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use wsrpc_server::{broadcast_event, Transport};
//!
//! # async fn example<C: Transport + 'static>(conns: Vec<Arc<C>>) -> wsrpc_core::Result<()> {
//! let results = broadcast_event(&conns, "tick", &serde_json::json!({"n": 1}), &CancellationToken::new())?;
//!
//! for outcome in results.collect().await {
//!     if let Err(e) = outcome.result {
//!         tracing::warn!(conn_id = outcome.conn.id(), error = %e, "Event not delivered");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::metrics::ServerMetrics;
use crate::transport::Transport;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use wsrpc_core::{codec, Error, Event, Result};

/// Result of writing a broadcast event to one connection
pub struct SendOutcome<C: ?Sized> {
    /// Target connection
    pub conn: Arc<C>,
    /// The write's result
    pub result: Result<()>,
}

impl<C: ?Sized> SendOutcome<C> {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Stream of per-connection outcomes of one broadcast
///
/// Yields exactly one outcome per target, then `None`.
pub struct BroadcastResults<C: ?Sized> {
    rx: mpsc::UnboundedReceiver<SendOutcome<C>>,
    targets: usize,
}

impl<C: ?Sized> BroadcastResults<C> {
    /// Number of connections the event was fanned out to
    pub fn targets(&self) -> usize {
        self.targets
    }

    /// Next outcome, `None` once every target has reported
    pub async fn next(&mut self) -> Option<SendOutcome<C>> {
        self.rx.recv().await
    }

    /// Wait for every outcome
    pub async fn collect(mut self) -> Vec<SendOutcome<C>> {
        let mut outcomes = Vec::with_capacity(self.targets);
        while let Some(outcome) = self.rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Encode an event frame
fn encode_event<T: Serialize + ?Sized>(name: &str, data: &T) -> Result<String> {
    let event = Event::with_data(name, data)?;
    codec::encode_event(&event)
}

/// Write `text` unless `cancel` fires first
async fn write_or_cancel<C>(conn: &C, text: &str, cancel: &CancellationToken) -> Result<()>
where
    C: Transport + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        written = conn.write_message(text) => written,
    }
}

/// Send one event to one connection
///
/// The write error, if any, is returned to the caller.
#[tracing::instrument(level = "debug", skip(conn, data, cancel), fields(conn_id = conn.id()))]
pub async fn send_event<C, T>(conn: &C, name: &str, data: &T, cancel: &CancellationToken) -> Result<()>
where
    C: Transport + ?Sized,
    T: Serialize + ?Sized,
{
    let text = encode_event(name, data)?;
    write_or_cancel(conn, &text, cancel).await
}

/// Send one event to many connections concurrently
///
/// The event is encoded once before anything is spawned; an encoding error is
/// returned immediately. Otherwise control returns as soon as the writes have
/// been spawned. Must be called within a Tokio runtime.
pub fn broadcast_event<C, T>(
    conns: &[Arc<C>],
    name: &str,
    data: &T,
    cancel: &CancellationToken,
) -> Result<BroadcastResults<C>>
where
    C: Transport + ?Sized + 'static,
    T: Serialize + ?Sized,
{
    broadcast_instrumented(conns, name, data, cancel, None)
}

pub(crate) fn broadcast_instrumented<C, T>(
    conns: &[Arc<C>],
    name: &str,
    data: &T,
    cancel: &CancellationToken,
    metrics: Option<Arc<ServerMetrics>>,
) -> Result<BroadcastResults<C>>
where
    C: Transport + ?Sized + 'static,
    T: Serialize + ?Sized,
{
    let frame: Arc<str> = Arc::from(encode_event(name, data)?);
    let event: Arc<str> = Arc::from(name);
    let (tx, rx) = mpsc::unbounded_channel();

    let mut writes = JoinSet::new();
    for conn in conns {
        let conn = Arc::clone(conn);
        let frame = Arc::clone(&frame);
        let cancel = cancel.clone();
        let tx = tx.clone();
        let event = Arc::clone(&event);
        let metrics = metrics.clone();

        writes.spawn(async move {
            // A panicking transport still reports an outcome for its target
            let result = AssertUnwindSafe(write_or_cancel(conn.as_ref(), &frame, &cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    tracing::error!(conn_id = conn.id(), event = %event, "Event write panicked");
                    Err(Error::Internal(format!(
                        "event write panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            if let Err(e) = &result {
                tracing::debug!(conn_id = conn.id(), event = %event, error = %e, "Event write failed");
            }
            if let Some(m) = &metrics {
                m.record_event(&event, result.is_ok());
            }
            // The caller may have dropped the results stream
            let _ = tx.send(SendOutcome { conn, result });
        });
    }

    let targets = conns.len();
    tokio::spawn(async move {
        while let Some(joined) = writes.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Event write task failed");
            }
        }
        tracing::debug!(event = %event, targets, "Broadcast complete");
        drop(tx);
    });

    Ok(BroadcastResults { rx, targets })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Sink {
        id: u64,
        delay: Duration,
        fail: bool,
        frames: Mutex<Vec<String>>,
    }

    impl Sink {
        fn new(id: u64, delay_ms: u64, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                delay: Duration::from_millis(delay_ms),
                fail,
                frames: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Sink {
        fn id(&self) -> u64 {
            self.id
        }

        async fn read_message(&self) -> Result<Vec<u8>> {
            std::future::pending().await
        }

        async fn write_message(&self, text: &str) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::ConnectionClosed);
            }
            self.frames.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Transport whose writes panic
    struct Exploding(u64);

    #[async_trait]
    impl Transport for Exploding {
        fn id(&self) -> u64 {
            self.0
        }

        async fn read_message(&self) -> Result<Vec<u8>> {
            std::future::pending().await
        }

        async fn write_message(&self, _text: &str) -> Result<()> {
            panic!("socket driver bug")
        }
    }

    #[tokio::test]
    async fn test_send_event() {
        let sink = Sink::new(1, 0, false);
        send_event(sink.as_ref(), "tick", &serde_json::json!({"n": 1}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            sink.frames.lock().unwrap().as_slice(),
            [r#"{"event":"tick","data":{"n":1}}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_send_event_propagates_error() {
        let sink = Sink::new(1, 0, true);
        let result = send_event(sink.as_ref(), "tick", &1, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_broadcast_reports_every_target() {
        let conns = vec![
            Sink::new(1, 30, false),
            Sink::new(2, 0, true),
            Sink::new(3, 5, false),
        ];

        let results = broadcast_event(&conns, "news", "hello", &CancellationToken::new()).unwrap();
        assert_eq!(results.targets(), 3);

        let outcomes = results.collect().await;
        assert_eq!(outcomes.len(), 3);

        let mut failed: Vec<u64> = outcomes
            .iter()
            .filter(|o| !o.is_delivered())
            .map(|o| o.conn.id())
            .collect();
        failed.sort();
        assert_eq!(failed, vec![2]);

        // Every delivered frame is the same single encoding
        for conn in [&conns[0], &conns[2]] {
            assert_eq!(
                conn.frames.lock().unwrap().as_slice(),
                [r#"{"event":"news","data":"hello"}"#.to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_panicking_write_still_reports_outcome() {
        let conns: Vec<Arc<dyn Transport>> = vec![
            Sink::new(1, 0, false) as Arc<dyn Transport>,
            Arc::new(Exploding(2)) as Arc<dyn Transport>,
            Sink::new(3, 10, false) as Arc<dyn Transport>,
        ];

        let results = broadcast_event(&conns, "news", &1, &CancellationToken::new()).unwrap();
        assert_eq!(results.targets(), 3);

        let outcomes = tokio::time::timeout(Duration::from_secs(2), results.collect())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);

        let failed: Vec<&SendOutcome<dyn Transport>> =
            outcomes.iter().filter(|o| !o.is_delivered()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].conn.id(), 2);
        assert!(matches!(
            &failed[0].result,
            Err(Error::Internal(msg)) if msg.contains("socket driver bug")
        ));
    }

    #[tokio::test]
    async fn test_panicking_write_records_metrics() {
        let conns: Vec<Arc<dyn Transport>> = vec![
            Arc::new(Exploding(1)) as Arc<dyn Transport>,
            Sink::new(2, 0, false) as Arc<dyn Transport>,
        ];
        let metrics = Arc::new(ServerMetrics::new("wsrpc-test"));

        let results = broadcast_instrumented(
            &conns,
            "news",
            &1,
            &CancellationToken::new(),
            Some(metrics),
        )
        .unwrap();

        let outcomes = results.collect().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_delivered()).count(), 1);
    }

    #[test]
    fn test_panic_message() {
        let from_str: Box<dyn Any + Send> = Box::new("static");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(from_str.as_ref()), "static");
        assert_eq!(panic_message(from_string.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_broadcast_to_nobody_closes_immediately() {
        let conns: Vec<Arc<Sink>> = Vec::new();
        let mut results = broadcast_event(&conns, "void", &(), &CancellationToken::new()).unwrap();
        assert!(results.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_broadcast_still_reports_all() {
        let conns = vec![Sink::new(1, 10_000, false), Sink::new(2, 10_000, false)];
        let cancel = CancellationToken::new();

        let results = broadcast_event(&conns, "slow", &1, &cancel).unwrap();
        cancel.cancel();

        let outcomes = tokio::time::timeout(Duration::from_secs(2), results.collect())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o.result, Err(Error::Cancelled))));
    }
}
