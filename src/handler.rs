//! WebSocket connection handler
//!
//! Handles one client connection: WebSocket handshake, the registration
//! handshake against the Registry, then the read loop that feeds the
//! Registry and the write task that drains the session's outbound queue.

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ChatMessage, MessageKind};
use crate::registry::RegistryCommand;
use crate::session::OUTBOUND_QUEUE_SIZE;
use crate::types::ConnId;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, reads the registration message and
/// asks the Registry to admit the username. A rejected connection gets
/// one Logout-kind message and is closed without ever touching registry
/// state; an admitted one runs until logout, shutdown, disconnect or
/// registry-initiated removal.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<RegistryCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let conn_id = ConnId::new();
    debug!("New TCP connection {} from {}", conn_id, peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Registration handshake: exactly one message, its body is the
    // desired username
    let first = read_registration(&mut ws_receiver).await?;
    if first.kind != MessageKind::Register {
        warn!(
            "Connection {} registered with kind {:?} instead of register",
            conn_id, first.kind
        );
    }
    let username = first.body.trim().to_string();

    // Bounded outbound queue, drained by the write task below
    let (msg_tx, mut msg_rx) = mpsc::channel::<ChatMessage>(OUTBOUND_QUEUE_SIZE);

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(RegistryCommand::Admit {
            username: username.clone(),
            sender: msg_tx,
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::RegistryClosed)?;

    let id = match reply_rx.await.map_err(|_| AppError::RegistryClosed)? {
        Ok(id) => id,
        Err(e) => {
            info!("Connection {} rejected: {}", conn_id, e);
            let json = rejection(&username).encode()?;
            ws_sender.send(Message::Text(json.into())).await?;
            let _ = ws_sender.close().await;
            return Ok(());
        }
    };

    info!(
        "Connection {} from {} admitted as '{}' (id {})",
        conn_id, peer_addr, username, id
    );

    // Clone cmd_tx for the read task
    let cmd_tx_read = cmd_tx.clone();

    // Read task (WebSocket -> RegistryCommand)
    let mut read_task = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ChatMessage::decode(&text) {
                    Ok(msg) => match msg.kind {
                        MessageKind::Text => {
                            // Re-stamp with the session's assigned id
                            let message =
                                ChatMessage::new(id.as_u64(), MessageKind::Text, msg.body);
                            if cmd_tx_read
                                .send(RegistryCommand::Broadcast { message })
                                .await
                                .is_err()
                            {
                                debug!("Registry closed, ending read task for id {}", id);
                                break;
                            }
                        }
                        MessageKind::Logout => {
                            debug!("Session {} logged out", id);
                            break;
                        }
                        MessageKind::Shutdown => {
                            info!("Session {} requested server shutdown", id);
                            let _ = cmd_tx_read.send(RegistryCommand::Shutdown).await;
                            break;
                        }
                        MessageKind::Register => {
                            warn!("Session {} sent register after admission, ignored", id);
                        }
                    },
                    Err(e) => {
                        warn!("Malformed frame from session {}: {}", id, e);
                        break;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Session {} sent close frame", id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong is handled automatically by tungstenite
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for session {}: {}", id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for session {}", id);
    });

    // Write task (outbound queue -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match msg.encode() {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for session {}", id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Whichever side finishes first, unblock the other so a session
    // stopped by the registry never sits in a blocked read
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Idempotent on the registry side: unknown ids are ignored
    let _ = cmd_tx.send(RegistryCommand::Remove { id }).await;

    info!("Session {} ('{}') disconnected", id, username);

    Ok(())
}

/// Read the single registration message that opens every connection
async fn read_registration<S>(ws_receiver: &mut S) -> Result<ChatMessage, AppError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => return Ok(ChatMessage::decode(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(AppError::NoRegistration),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Build the message sent to a connection whose username is already live
fn rejection(username: &str) -> ChatMessage {
    ChatMessage::new(
        0,
        MessageKind::Logout,
        format!("Username '{username}' is already registered"),
    )
}
