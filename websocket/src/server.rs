//! WebSocket listener.
//!
//! Accepts subscriber connections at `/` and `/ws` and registers each with
//! the [`BroadcastHub`]. Inbound traffic does not affect monitor state: text
//! frames are logged and dropped, pings are answered by the protocol layer
//! on the next read. `/metrics` exposes the
//! Prometheus registry in text format.

use async_trait::async_trait;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{ConnectInfo, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use prometheus::{Encoder, Registry, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::hub::{BroadcastHub, Subscriber};
use crate::HubError;

#[derive(Clone)]
struct AppState {
    hub: Arc<BroadcastHub>,
    registry: Registry,
}

/// The subscriber-facing server.
pub struct WebSocketServer {
    pub port: u16,
    hub: Arc<BroadcastHub>,
    registry: Registry,
}

impl WebSocketServer {
    pub fn new(port: u16, hub: Arc<BroadcastHub>, registry: Registry) -> Self {
        Self {
            port,
            hub,
            registry,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(AppState {
                hub: self.hub.clone(),
                registry: self.registry.clone(),
            })
    }

    /// Listen on `port` until `shutdown` resolves.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), HubError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("WebSocket server listening on {}", addr);
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), HubError> {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;
        Ok(())
    }
}

/// Write half of an accepted connection.
struct WsSubscriber {
    peer: SocketAddr,
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Subscriber for WsSubscriber {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    async fn send_text(&self, text: &str) -> Result<(), HubError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_string()))
            .await
            .map_err(|e| HubError::Transport(e.to_string()))
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state.hub))
}

/// Register the connection, then drain inbound frames until it closes.
async fn handle_socket(socket: WebSocket, peer: SocketAddr, hub: Arc<BroadcastHub>) {
    let (sink, mut inbound) = socket.split();
    let subscriber = Arc::new(WsSubscriber {
        peer,
        sink: Mutex::new(sink),
    });

    let id = hub.add_subscriber(subscriber.clone()).await;
    info!(%peer, "{} client(s) connected", hub.subscriber_count().await);

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!(%peer, len = text.len(), "ignoring inbound message");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%peer, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    hub.remove_subscriber(id).await;
    info!(%peer, "{} client(s) connected", hub.subscriber_count().await);
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&state.registry.gather(), &mut buf) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buf,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
