//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::RoomHandle;
use crate::ws::protocol::{decode_client_msg, encode, ProtocolError, ServerMsg, Snapshot};

/// WebSocket upgrade handler for `/ws/:room`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let room = state.rooms.get_or_create(&room_id);
    ws.on_upgrade(move |socket| handle_socket(socket, room))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, room: RoomHandle) {
    let conn_id = Uuid::new_v4();
    info!(room_id = %room.id, conn_id = %conn_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        id: conn_id,
        room: room.id.clone(),
        config: (*room.config).clone(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(conn_id = %conn_id, error = %e, "Failed to send welcome");
        return;
    }

    let Some(snapshot_rx) = room.connect(conn_id).await else {
        warn!(room_id = %room.id, conn_id = %conn_id, "Room is not running");
        return;
    };

    run_session(conn_id, &room, ws_sink, ws_stream, snapshot_rx).await;

    room.close(conn_id).await;
    info!(room_id = %room.id, conn_id = %conn_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: Uuid,
    room: &RoomHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut snapshot_rx: broadcast::Receiver<Arc<Snapshot>>,
) {
    // Writer task: room broadcasts -> WebSocket, addressed to this connection
    let writer_handle = tokio::spawn(async move {
        loop {
            match snapshot_rx.recv().await {
                Ok(snapshot) => {
                    let msg = ServerMsg::Snapshot(snapshot.for_recipient(conn_id));
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Stale snapshots are worthless; carry on with the newest
                    debug!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipped snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(conn_id = %conn_id, "Snapshot channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match decode_client_msg(&text) {
                Ok(msg) => {
                    if !room.send(conn_id, msg).await {
                        debug!(conn_id = %conn_id, "Room command channel closed");
                        break;
                    }
                }
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "Dropped client message");
                }
            },
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), SendError> {
    let json = encode(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error(transparent)]
    Encode(#[from] ProtocolError),

    #[error(transparent)]
    Socket(#[from] axum::Error),
}
