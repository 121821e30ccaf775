//! Message transport abstraction and its WebSocket implementation
//!
//! The serve loop and the event broadcast only need two capabilities from a
//! connection: read one message and write one message. [`Transport`] names
//! them; [`WsConnection`] provides them over tokio-tungstenite.
//!
//! # Concurrency
//!
//! A transport is shared between the connection's serve loop (the only
//! reader) and any number of event senders. Implementations serialize their
//! writes so that at most one write is in flight per connection.
//! `WsConnection` does this by keeping each half of the split WebSocket
//! behind its own async mutex, so a pending read never blocks a write.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use wsrpc_core::{Error, Result};

/// Identifier the server assigns to each connection
pub type ConnectionId = u64;

/// Read-one/write-one message capability of a connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifier used in logs, contexts and broadcast outcomes
    fn id(&self) -> ConnectionId;

    /// Wait for the next inbound message
    ///
    /// Returns `Error::ConnectionClosed` once the peer has closed.
    async fn read_message(&self) -> Result<Vec<u8>>;

    /// Write one complete outbound message
    async fn write_message(&self, text: &str) -> Result<()>;
}

/// WebSocket connection usable as a [`Transport`]
pub struct WsConnection<S> {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-upgraded WebSocket
    pub fn new(id: ConnectionId, ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }

    /// Run the server side of the WebSocket handshake on `stream`
    pub async fn accept(id: ConnectionId, stream: S) -> Result<Self> {
        let ws = accept_async(stream)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        Ok(Self::new(id, ws))
    }

    /// Send a close frame
    pub async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.close().await.map_err(|e| Error::WebSocket(e.to_string()))
    }
}

#[async_trait]
impl<S> Transport for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn read_message(&self) -> Result<Vec<u8>> {
        let mut stream = self.stream.lock().await;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(conn_id = self.id, ?frame, "Close frame received");
                    return Err(Error::ConnectionClosed);
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                None => return Err(Error::ConnectionClosed),
            }
        }
    }

    async fn write_message(&self, text: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_owned()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}
