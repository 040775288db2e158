//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: registry-assigned numeric session identifier
//! - `ConnId`: UUID tagging a connection before it is admitted

use uuid::Uuid;

/// Registry-assigned session identifier (newtype pattern)
///
/// Assigned once at successful admission from a strictly increasing
/// counter; never reused for the life of the process, even after the
/// session disconnects. The value 0 is reserved for "not yet assigned"
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Raw numeric value, as carried in the `sender_id` wire field
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection identifier (newtype pattern)
///
/// Wraps a UUID v4 tagging one accepted connection in logs. A connection
/// has no `SessionId` until the registry admits it, so this is the only
/// handle log lines can correlate on during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
