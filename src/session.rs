//! Session handle definition
//!
//! The registry-side record of one admitted client connection.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ChatMessage;
use crate::types::SessionId;

/// Capacity of each session's outbound queue
///
/// Fan-out uses `try_send`, so a client that stops draining its socket
/// fills this queue and starts losing messages instead of stalling
/// delivery to everyone else.
pub const OUTBOUND_QUEUE_SIZE: usize = 32;

/// Admitted session information
///
/// Holds the registry's view of one connection: the assigned id, the
/// admitted username, the bounded channel into the connection's write
/// task, and the active flag. The WebSocket itself stays with the
/// connection task; the registry only ever touches this handle.
#[derive(Debug)]
pub struct SessionHandle {
    /// Registry-assigned identifier
    pub id: SessionId,
    /// Username this session registered under
    pub username: String,
    /// Session's outbound message queue (drained by its write task)
    sender: mpsc::Sender<ChatMessage>,
    /// Cleared exactly once when the session is stopped
    active: bool,
}

impl SessionHandle {
    /// Create a handle for a freshly admitted session
    pub fn new(id: SessionId, username: String, sender: mpsc::Sender<ChatMessage>) -> Self {
        Self {
            id,
            username,
            sender,
            active: true,
        }
    }

    /// Queue a message for this session without blocking
    ///
    /// Best-effort: a full queue or a gone connection is reported as an
    /// error for the caller to log, never to propagate.
    pub fn send(&self, msg: ChatMessage) -> Result<(), SendError> {
        if !self.active {
            return Err(SendError::Inactive);
        }
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Whether this session is still active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop this session
    ///
    /// Idempotent. Dropping the handle afterwards closes the outbound
    /// channel, which unwinds the connection's write and read tasks.
    pub fn stop(&mut self) {
        self.active = false;
    }
}
