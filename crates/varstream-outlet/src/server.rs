//! WebSocket endpoint for bus traffic.
//!
//! [`SampleServer`] forwards every [`BusMessage`] on a [`StreamBus`] to
//! connected clients as one JSON text frame per message. On connect a
//! client first receives a `stream_opened` message for every stream that
//! is already open, then live traffic.
//!
//! Clients may narrow the feed by sending
//!
//! ```json
//! {"subscribe": ["level", "spec"]}
//! ```
//!
//! An empty list restores the full feed.

use std::collections::HashSet;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use varstream_types::{BridgeError, Result};

use crate::bus::{BusMessage, StreamBus};

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    subscribe: Vec<String>,
}

/// Parse a client control message.
///
/// Returns `Some(filter)` for a valid subscribe request, where an empty
/// filter means "everything", and `None` for anything else.
fn parse_subscription(text: &str) -> Option<HashSet<String>> {
    serde_json::from_str::<SubscribeRequest>(text)
        .ok()
        .map(|req| req.subscribe.into_iter().collect())
}

fn wanted(filter: &HashSet<String>, message: &BusMessage) -> bool {
    filter.is_empty() || filter.contains(message.stream_name())
}

/// Serves a [`StreamBus`] over WebSocket.
#[derive(Clone, Debug)]
pub struct SampleServer {
    bus: StreamBus,
}

impl SampleServer {
    pub fn new(bus: StreamBus) -> Self {
        Self { bus }
    }

    /// Bind `addr` and serve until the task is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Outlet`] if the listener cannot be bound.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Outlet(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "sample server listening");
        self.run_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn run_on(self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_client(stream, peer).await {
                            error!(%peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| BridgeError::Outlet(format!("ws handshake from {peer}: {e}")))?;
        debug!(%peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        // Subscribe before the snapshot so no announcement falls in between.
        let mut rx = self.bus.subscribe();
        let mut filter = HashSet::new();

        for message in self.bus.open_streams() {
            let json = serde_json::to_string(&message)
                .map_err(|e| BridgeError::Outlet(e.to_string()))?;
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                return Ok(());
            }
        }

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(message) => {
                            if !wanted(&filter, &message) {
                                continue;
                            }
                            let json = serde_json::to_string(&message)
                                .map_err(|e| BridgeError::Outlet(e.to_string()))?;
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(%peer, lagged_by = n, "ws client lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(Message::Text(text))) => match parse_subscription(text.as_str()) {
                            Some(next) => {
                                debug!(%peer, streams = next.len(), "ws client subscription changed");
                                filter = next;
                            }
                            None => warn!(%peer, "ignoring unrecognised ws message"),
                        },
                        _ => {}
                    }
                }
            }
        }

        debug!(%peer, "ws client disconnected");
        Ok(())
    }
}
