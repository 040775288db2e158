//! Multi-Client Chat Relay Library
//!
//! A broadcast chat relay server built with tokio-tungstenite using the
//! Actor pattern for state management.
//!
//! # Features
//! - WebSocket connection handling
//! - Username registration with uniqueness enforcement
//! - Broadcast of chat messages to all admitted sessions
//! - In-chat `ban <name>` / `unban <name>` moderation commands
//! - Clean server shutdown from a client request
//! - Disconnection handling with removal notices
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Registry` is the central actor owning the session maps and ban set
//! - Each connection has a `handler` task communicating with the registry
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use chat_relay::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::new("127.0.0.1:1500").run().await.unwrap();
//! }
//! ```

pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{ChatMessage, MessageKind, ModCommand};
pub use registry::{Registry, RegistryCommand};
pub use server::Server;
pub use session::SessionHandle;
pub use types::{ConnId, SessionId};
