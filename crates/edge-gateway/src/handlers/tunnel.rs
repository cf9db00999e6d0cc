//! WebSocket-to-TCP tunnel (VNC over websockify).
//!
//! The request is authenticated before the upgrade is accepted; a denied
//! request gets a plain HTTP response and no tunnel is ever opened.

use crate::auth::headers::OidcHeaders;
use crate::auth::EdgeAuthenticator;
use crate::bridge::{SessionBridge, TunnelBridge};
use crate::errors::GatewayError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_BUFFER_BYTES: usize = 16 * 1024;

/// State for the tunnel route, which only exists when a target is configured.
pub struct TunnelState {
    /// Shared verification pipeline.
    pub authenticator: Arc<EdgeAuthenticator>,

    /// `host:port` every accepted tunnel connects to.
    pub target: String,
}

/// Handler for GET /websockify
#[tracing::instrument(skip_all, name = "edge.handlers.websockify")]
pub async fn websockify(
    State(state): State<Arc<TunnelState>>,
    headers: OidcHeaders,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let result = state.authenticator.authenticate(&headers).await;
    if let Err(denial) = TunnelBridge.bridge(result) {
        return denial.into_response();
    }

    let Some(ws) = ws else {
        return GatewayError::BadRequest("WebSocket upgrade required".to_string()).into_response();
    };

    let target = state.target.clone();
    ws.on_upgrade(move |socket| tunnel(socket, target))
}

/// Copy frames between `socket` and a TCP connection to `target` until either
/// side closes.
async fn tunnel(socket: WebSocket, target: String) {
    let stream = match TcpStream::connect(&target).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(target: "edge.handlers.websockify", error = %e, "Failed to connect to tunnel target");
            let _ = socket.close().await;
            return;
        }
    };
    tracing::info!(target: "edge.handlers.websockify", "Tunnel opened");

    let (mut tcp_read, mut tcp_write) = stream.into_split();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let client_to_target = async {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Binary(data)) => tcp_write.write_all(&data).await?,
                Ok(Message::Text(text)) => tcp_write.write_all(text.as_bytes()).await?,
                Ok(Message::Close(_)) | Err(_) => break,
                // Ping/pong are answered by axum
                Ok(_) => {}
            }
        }
        tcp_write.shutdown().await
    };

    let target_to_client = async {
        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        loop {
            let n = tcp_read.read(&mut buf).await?;
            let Some(chunk) = buf.get(..n).filter(|c| !c.is_empty()) else {
                break;
            };
            if ws_tx.send(Message::Binary(chunk.to_vec())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        Ok::<_, std::io::Error>(())
    };

    let outcome = tokio::select! {
        r = client_to_target => r,
        r = target_to_client => r,
    };
    match outcome {
        Ok(()) => tracing::info!(target: "edge.handlers.websockify", "Tunnel closed"),
        Err(e) => tracing::warn!(target: "edge.handlers.websockify", error = %e, "Tunnel closed with error"),
    }
}
