//! WebSocket upgrade handler

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{GameDriver, GameSession, PlayMode};
use crate::store::SessionKey;
use crate::ws::protocol::{ClientCommand, ServerMsg};

const EVENT_BUFFER: usize = 256;
/// How long queued events may take to flush after the session ends
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler. Mode and user id come from the route and are
/// trusted.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((mode, user_id)): Path<(String, u64)>,
    State(state): State<AppState>,
) -> Response {
    let mode = PlayMode::from_path(&mode);
    info!(user_id, mode = %mode, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, mode, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: u64, mode: PlayMode, state: AppState) {
    let connection_id = state.registry.register(user_id, mode);
    info!(user_id, mode = %mode, connection_id = %connection_id, "New WebSocket connection");

    let session = GameSession::load(SessionKey::new(mode, user_id), state.session_stores()).await;
    let (ws_sink, mut ws_stream) = socket.split();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

    let mut writer_handle = tokio::spawn(write_events(user_id, ws_sink, events_rx));

    let mut driver = GameDriver::new(session, events_tx, state.timing);
    let failed = driver.failure_signal();

    // Reader loop: WebSocket -> driver
    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                let Some(result) = frame else {
                    debug!(user_id, "WebSocket stream ended");
                    break;
                };
                match result {
                    Ok(Message::Text(text)) => handle_text(&mut driver, user_id, &text).await,
                    Ok(Message::Binary(_)) => {
                        warn!(user_id, "Received binary message, ignoring");
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        info!(user_id, "Client initiated close");
                        break;
                    }
                    Err(e) => {
                        error!(user_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            _ = failed.notified() => {
                warn!(user_id, "Session failed, closing connection");
                break;
            }
        }
    }

    // Cancel the tick loop, then persist
    driver.shutdown().await;

    if tokio::time::timeout(WRITER_DRAIN, &mut writer_handle).await.is_err() {
        debug!(user_id, "Writer did not drain in time");
        writer_handle.abort();
    }

    state.registry.remove(&connection_id);
    info!(user_id, mode = %mode, "WebSocket connection closed");
}

async fn handle_text(driver: &mut GameDriver, user_id: u64, text: &str) {
    match ClientCommand::parse(text) {
        Ok(ClientCommand::Start) => {
            info!(user_id, "Start requested");
            driver.start().await;
        }
        Ok(ClientCommand::Pause) => {
            info!(user_id, "Paused");
            driver.pause();
        }
        Ok(ClientCommand::Resume) => {
            info!(user_id, "Resumed");
            driver.resume();
        }
        Ok(ClientCommand::Keys(frame)) => driver.buffer_input(frame),
        Err(e) => {
            warn!(user_id, error = %e, "Dropping malformed frame");
        }
    }
}

/// Writer task: session events -> WebSocket. Ends when every sender is
/// gone, the socket fails or a fatal error has been delivered.
async fn write_events(
    user_id: u64,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut events_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = events_rx.recv().await {
        let fatal = matches!(&msg, ServerMsg::Error { code, .. } if code == "session_failed");

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(user_id, error = %e, "WebSocket send failed");
            return;
        }

        if fatal {
            let _ = ws_sink.send(Message::Close(None)).await;
            return;
        }
    }

    let _ = ws_sink.close().await;
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
