//! Resumable event subscription over the RPC websocket.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::event::{parse_event, subscription_requests, ChainEvent};
use crate::UpstreamError;

/// Derive the event websocket URL from an RPC base URL
/// (`https://rpc.example` → `wss://rpc.example/websocket`).
pub fn websocket_url(rpc_url: &str) -> String {
    let base = rpc_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws}/websocket")
}

/// Long-lived subscription to vote, round-step and validator-set events.
///
/// Every (re)connect sends all three subscribe requests before events are
/// forwarded. Decoded events go to an `mpsc` channel; the stream stops once
/// the receiving side is dropped.
pub struct EventStream {
    url: String,
    reconnect_delay: Duration,
}

/// How a single websocket session ended.
enum SessionEnd {
    /// The consumer dropped the event channel.
    ReceiverClosed,
}

impl EventStream {
    pub fn new(rpc_url: &str, reconnect_delay: Duration) -> Self {
        Self {
            url: websocket_url(rpc_url),
            reconnect_delay,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run until `events` is closed, reconnecting after every failure.
    pub async fn run(self, events: mpsc::Sender<ChainEvent>) {
        loop {
            match self.session(&events).await {
                Ok(SessionEnd::ReceiverClosed) => {
                    debug!("event receiver dropped, stopping subscription");
                    return;
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "event subscription lost, reconnecting");
                }
            }
            if events.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(&self, events: &mpsc::Sender<ChainEvent>) -> Result<SessionEnd, UpstreamError> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| UpstreamError::Unreachable(format!("{}: {e}", self.url)))?;

        for request in subscription_requests() {
            ws.send(Message::Text(request))
                .await
                .map_err(|e| UpstreamError::Subscription(e.to_string()))?;
            // Read the acknowledgement. An event that races ahead of it is
            // still forwarded.
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    if forward(&text, events).await.is_err() {
                        return Ok(SessionEnd::ReceiverClosed);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(UpstreamError::Subscription(e.to_string())),
                None => {
                    return Err(UpstreamError::Subscription(
                        "closed before subscription was acknowledged".into(),
                    ))
                }
            }
        }
        info!(url = %self.url, "subscribed to consensus events");

        while let Some(frame) = ws.next().await {
            match frame.map_err(|e| UpstreamError::Subscription(e.to_string()))? {
                Message::Text(text) => {
                    if forward(&text, events).await.is_err() {
                        return Ok(SessionEnd::ReceiverClosed);
                    }
                }
                Message::Ping(payload) => {
                    ws.send(Message::Pong(payload))
                        .await
                        .map_err(|e| UpstreamError::Subscription(e.to_string()))?;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(UpstreamError::Subscription("event stream closed".into()))
    }
}

/// Decode a frame and pass any event on. `Err` means the receiver is gone.
async fn forward(text: &str, events: &mpsc::Sender<ChainEvent>) -> Result<(), ()> {
    match parse_event(text) {
        Ok(Some(event)) => events.send(event).await.map_err(|_| ()),
        Ok(None) => Ok(()),
        Err(e) => {
            warn!(error = %e, "discarding malformed event frame");
            Ok(())
        }
    }
}
