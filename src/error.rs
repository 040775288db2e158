//! Error types for the chat relay
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (surfaced to the client before closing).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Username is already held by a live session
    #[error("Username '{0}' is already registered")]
    UsernameTaken(String),

    /// Registry actor is no longer running
    #[error("Registry closed")]
    RegistryClosed,

    /// Connection closed before the registration message arrived
    #[error("Connection closed before registration")]
    NoRegistration,
}

/// Message send errors
///
/// Occurs when handing a message to a session's bounded outbound queue.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The session's outbound queue is full (slow client)
    #[error("Outbound queue full")]
    QueueFull,

    /// The session has already been stopped
    #[error("Session inactive")]
    Inactive,
}
