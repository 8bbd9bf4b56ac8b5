//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection drives its own `Coordinator`: client messages become events,
//! and every coordinator update is pushed back as a `ServerMessage`.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::ServiceState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use eduquest_core::coordinator::{Coordinator, CoordinatorHandle};
use eduquest_core::domain::ClientId;
use futures::{
    stream::{SplitSink, SplitStream, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServiceState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServiceState>) {
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let Some(client) = await_init(&mut sender, &mut receiver).await else {
        return;
    };
    info!(%client, "WebSocket connection initialized");

    let (coordinator, handle, mut updates) = Coordinator::new(state.services(), client);
    let coordinator_task = tokio::spawn(coordinator.run());

    // --- 2. Outbound Pump ---
    // Coordinator updates and protocol errors share one writer.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let relay_tx = out_tx.clone();
    let relay_task = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if relay_tx.send(ServerMessage::from(update)).is_err() {
                break;
            }
        }
    });
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if send_message(&mut sender, &message).await.is_err() {
                warn!("Client went away; dropping outbound messages.");
                break;
            }
        }
    });

    // --- 3. Main Message Loop ---
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !handle_text_message(text.as_str(), &handle, &out_tx, &state) {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!(%client, "Client closed the connection.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%client, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    handle.shutdown();
    drop(out_tx);
    match coordinator_task.await {
        Ok(final_state) => info!(%client, view = %final_state.view.as_str(), "Coordinator stopped"),
        Err(e) => error!(%client, "Coordinator task failed: {:?}", e),
    }
    let _ = relay_task.await;
    let _ = writer_task.await;
    info!(%client, "Connection cleanup complete.");
}

/// Waits for the `init` message that binds the connection to a client id.
async fn await_init(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
) -> Option<ClientId> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                return match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Init { client_id }) => Some(ClientId(client_id)),
                    Ok(_) | Err(_) => {
                        error!("First message was not a valid Init message.");
                        let err = ServerMessage::Error {
                            message: "The first message must be init.".to_string(),
                        };
                        let _ = send_message(sender, &err).await;
                        None
                    }
                };
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => {
                info!("Client disconnected before sending Init message.");
                return None;
            }
        }
    }
}

/// Dispatches one client message. Returns `false` once the coordinator is gone.
fn handle_text_message(
    text: &str,
    handle: &CoordinatorHandle,
    out: &mpsc::UnboundedSender<ServerMessage>,
    state: &ServiceState,
) -> bool {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Received an invalid client message: {}", e);
            let _ = out.send(ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            });
            return true;
        }
    };
    match message.into_event(state.config.default_total_points) {
        Ok(event) => handle.dispatch(event),
        Err(e) => {
            let _ = out.send(ServerMessage::Error {
                message: e.to_string(),
            });
            true
        }
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
