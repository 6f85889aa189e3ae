//! WebSocket binding: `/ws` upgrade, one task per text frame, replies correlated by `id`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::dispatch::{ToolDispatch, ToolResponse};
use super::http::health;
use crate::tools::ToolError;

/// Build the WebSocket router: `GET /ws` upgrades, `GET /health` reports liveness.
pub fn create_router<D>(dispatch: Arc<D>) -> Router
where
    D: ToolDispatch,
{
    Router::new()
        .route("/ws", get(ws_handler::<D>))
        .route("/health", get(health::<D>))
        .with_state(dispatch)
}

async fn ws_handler<D>(ws: WebSocketUpgrade, State(dispatch): State<Arc<D>>) -> Response
where
    D: ToolDispatch,
{
    ws.on_upgrade(move |socket| handle_socket(socket, dispatch))
}

/// Each text frame is dispatched on its own task; replies share one writer task and may
/// arrive out of order, so callers correlate them by `id`.
async fn handle_socket<D>(socket: WebSocket, dispatch: Arc<D>)
where
    D: ToolDispatch,
{
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            if sink.send(Message::Text(reply)).await.is_err() {
                break;
            }
        }
    });

    tracing::debug!("WebSocket connection opened");
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let dispatch = dispatch.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = dispatch.dispatch_raw(&text).await;
                    send_reply(&tx, &response);
                });
            }
            Ok(Message::Binary(_)) => {
                let error = ToolError::InvalidRequest("binary frames are not supported".into());
                send_reply(&tx, &ToolResponse::failure(None, &error));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "WebSocket receive failed");
                break;
            }
        }
    }

    // In-flight tasks keep running; their replies are dropped once the writer is gone.
    writer.abort();
    tracing::debug!("WebSocket connection closed");
}

fn send_reply(tx: &mpsc::UnboundedSender<String>, response: &ToolResponse) {
    match serde_json::to_string(response) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(err) => tracing::error!(error = %err, "Failed to encode reply"),
    }
}
