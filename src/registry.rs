//! Registry actor implementation
//!
//! The central actor that owns all shared state: the live-session maps and
//! the ban set. Uses the Actor pattern with mpsc channels for message
//! passing; running every command on one task is what makes admit, remove,
//! ban and broadcast mutually exclusive.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{ChatMessage, MessageKind, ModCommand};
use crate::session::SessionHandle;
use crate::types::SessionId;

/// Commands sent from connection handlers to the Registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Admit a new session under `username`
    Admit {
        username: String,
        sender: mpsc::Sender<ChatMessage>,
        reply: oneshot::Sender<Result<SessionId, AppError>>,
    },
    /// Remove a session; no-op if the id is already gone
    Remove {
        id: SessionId,
    },
    /// Fan a message out to every admitted session
    Broadcast {
        message: ChatMessage,
    },
    /// Tear the whole server down
    Shutdown,
}

/// The registry actor
///
/// The two session maps are kept as one bijection: every id maps to a
/// username whose handle carries that same id. Only the actor task
/// mutates any of this, so no operation ever observes another one
/// half-applied.
pub struct Registry {
    /// Admitted sessions: username -> handle
    sessions_by_username: HashMap<String, SessionHandle>,
    /// Inverse map: id -> username
    usernames_by_id: HashMap<SessionId, String>,
    /// Usernames whose messages are currently suppressed
    banned: HashSet<String>,
    /// Last assigned id; strictly increasing, never reused
    next_id: u64,
    /// Cleared by shutdown; ends the command loop
    active: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    /// Create a new Registry with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            sessions_by_username: HashMap::new(),
            usernames_by_id: HashMap::new(),
            banned: HashSet::new(),
            next_id: 0,
            active: true,
            receiver,
        }
    }

    /// Run the Registry event loop
    ///
    /// Processes commands until shutdown is requested or all senders are
    /// dropped. The accept loop watches this task finish to know when to
    /// stop accepting.
    pub async fn run(mut self) {
        info!("Registry started");

        while self.active {
            let Some(cmd) = self.receiver.recv().await else {
                break;
            };
            self.handle_command(cmd);
        }

        info!("Registry stopped");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Admit {
                username,
                sender,
                reply,
            } => {
                self.handle_admit(username, sender, reply);
            }
            RegistryCommand::Remove { id } => {
                self.handle_remove(id);
            }
            RegistryCommand::Broadcast { message } => {
                self.handle_broadcast(message);
            }
            RegistryCommand::Shutdown => {
                self.handle_shutdown();
            }
        }
    }

    /// Handle an admission request
    ///
    /// Rejects if the username is already held by a live session; being
    /// banned does not block connecting. On success the new session gets
    /// the next id and a welcome message carrying it.
    fn handle_admit(
        &mut self,
        username: String,
        sender: mpsc::Sender<ChatMessage>,
        reply: oneshot::Sender<Result<SessionId, AppError>>,
    ) {
        if !self.active {
            let _ = reply.send(Err(AppError::RegistryClosed));
            return;
        }

        if self.sessions_by_username.contains_key(&username) {
            info!("Rejected '{}': username already registered", username);
            let _ = reply.send(Err(AppError::UsernameTaken(username)));
            return;
        }

        self.next_id += 1;
        let id = SessionId(self.next_id);

        if reply.send(Ok(id)).is_err() {
            // Handler went away while waiting; the id is burned, the
            // session is not stored.
            debug!("Admission reply for '{}' had no receiver", username);
            return;
        }

        let handle = SessionHandle::new(id, username.clone(), sender);
        let welcome = ChatMessage::new(
            id.as_u64(),
            MessageKind::Text,
            format!("Welcome {username}! Your id is {id}. You can start chatting"),
        );
        if let Err(e) = handle.send(welcome) {
            warn!("Could not deliver welcome to '{}': {}", username, e);
        }

        self.sessions_by_username.insert(username.clone(), handle);
        self.usernames_by_id.insert(id, username.clone());

        info!(
            "Admitted '{}' with id {}; {} connected",
            username,
            id,
            self.sessions_by_username.len()
        );
    }

    /// Handle a session removal
    ///
    /// A removal notice goes out to the current sessions before any state
    /// changes, then the session leaves both maps, then any ban on the
    /// username is lifted (a ban does not survive a clean remove).
    fn handle_remove(&mut self, id: SessionId) {
        let Some(username) = self.usernames_by_id.get(&id).cloned() else {
            debug!("Remove for unknown id {} ignored", id);
            return;
        };

        let notice = ChatMessage::new(
            id.as_u64(),
            MessageKind::Text,
            format!("{username} (id {id}) has left the chat"),
        );
        self.handle_broadcast(notice);

        if let Some(mut handle) = self.sessions_by_username.remove(&username) {
            handle.stop();
        }
        self.usernames_by_id.remove(&id);

        if self.banned.remove(&username) {
            info!("Lifting ban on '{}' after removal", username);
        }

        info!(
            "Removed session {} ('{}'); {} connected",
            id,
            username,
            self.sessions_by_username.len()
        );
    }

    /// Ban a username; idempotent
    pub fn ban(&mut self, username: &str) {
        if self.banned.insert(username.to_string()) {
            info!("Banned '{}'", username);
        }
        debug!("Ban set: {:?}", self.banned);
    }

    /// Unban a username; idempotent
    pub fn unban(&mut self, username: &str) {
        if self.banned.remove(username) {
            info!("Unbanned '{}'", username);
        }
        debug!("Ban set: {:?}", self.banned);
    }

    /// Handle a broadcast
    ///
    /// Applies any embedded ban/unban command first. If the *sender's*
    /// username is banned, delivery is suppressed for every recipient,
    /// not just dropped for the sender. Otherwise every admitted session
    /// gets the message, the sender included; a recipient whose queue is
    /// full or gone is skipped, never aborting the rest of the fan-out.
    fn handle_broadcast(&mut self, message: ChatMessage) {
        if !self.active {
            return;
        }

        match ModCommand::parse(&message.body) {
            Some(ModCommand::Ban(name)) if !self.banned.contains(&name) => self.ban(&name),
            Some(ModCommand::Unban(name)) if self.banned.contains(&name) => self.unban(&name),
            _ => {}
        }

        let sender_banned = self
            .usernames_by_id
            .get(&SessionId(message.sender_id))
            .is_some_and(|name| self.banned.contains(name));
        if sender_banned {
            debug!(
                "Suppressed broadcast from banned sender id {}",
                message.sender_id
            );
            return;
        }

        for handle in self.sessions_by_username.values() {
            if !handle.is_active() {
                continue;
            }
            if let Err(e) = handle.send(message.clone()) {
                warn!("Dropping message for '{}': {}", handle.username, e);
            }
        }
    }

    /// Handle a shutdown request
    ///
    /// Stops every session, clears all state and ends the command loop;
    /// the accept loop observes the actor finishing and stops too.
    fn handle_shutdown(&mut self) {
        info!(
            "Shutdown requested; stopping {} sessions",
            self.sessions_by_username.len()
        );

        for handle in self.sessions_by_username.values_mut() {
            handle.stop();
        }
        self.sessions_by_username.clear();
        self.usernames_by_id.clear();
        self.banned.clear();
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OUTBOUND_QUEUE_SIZE;

    fn new_registry() -> Registry {
        let (_tx, rx) = mpsc::channel(8);
        Registry::new(rx)
    }

    /// Admit a session directly through the handler, draining the welcome
    async fn admit(reg: &mut Registry, username: &str) -> (SessionId, mpsc::Receiver<ChatMessage>) {
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (reply_tx, reply_rx) = oneshot::channel();
        reg.handle_admit(username.to_string(), tx, reply_tx);
        let id = reply_rx.await.unwrap().unwrap();
        let welcome = rx.recv().await.unwrap();
        assert_eq!(welcome.sender_id, id.as_u64());
        (id, rx)
    }

    fn text_from(id: SessionId, body: &str) -> ChatMessage {
        ChatMessage::new(id.as_u64(), MessageKind::Text, body)
    }

    #[tokio::test]
    async fn admit_assigns_increasing_ids_and_welcomes() {
        let mut reg = new_registry();

        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (reply_tx, reply_rx) = oneshot::channel();
        reg.handle_admit("alice".to_string(), tx, reply_tx);

        let id = reply_rx.await.unwrap().unwrap();
        assert!(id.as_u64() > 0);

        let welcome = rx.recv().await.unwrap();
        assert_eq!(welcome.kind, MessageKind::Text);
        assert_eq!(welcome.sender_id, id.as_u64());
        assert!(welcome.body.contains(&id.to_string()));

        let (id2, _rx2) = admit(&mut reg, "bob").await;
        assert!(id2 > id);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let mut reg = new_registry();
        let (_id, _rx) = admit(&mut reg, "alice").await;

        let (tx, mut rx2) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (reply_tx, reply_rx) = oneshot::channel();
        reg.handle_admit("alice".to_string(), tx, reply_tx);

        let err = reply_rx.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::UsernameTaken(name) if name == "alice"));
        // No welcome, no registry entry for the loser
        assert!(rx2.try_recv().is_err());
        assert_eq!(reg.sessions_by_username.len(), 1);
        assert_eq!(reg.usernames_by_id.len(), 1);
    }

    #[tokio::test]
    async fn username_is_admittable_again_after_remove() {
        let mut reg = new_registry();
        let (id1, _rx1) = admit(&mut reg, "alice").await;

        reg.handle_remove(id1);
        assert!(reg.sessions_by_username.is_empty());
        assert!(reg.usernames_by_id.is_empty());

        let (id2, _rx2) = admit(&mut reg, "alice").await;
        assert!(id2 > id1, "ids are never reused");
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_including_sender() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;
        let (_bob, mut rx_b) = admit(&mut reg, "bob").await;
        let (_carol, mut rx_c) = admit(&mut reg, "carol").await;

        reg.handle_broadcast(text_from(alice, "hello all"));

        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.sender_id, alice.as_u64());
            assert_eq!(got.body, "hello all");
        }
    }

    #[tokio::test]
    async fn banned_sender_broadcast_reaches_nobody() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;
        let (bob, mut rx_b) = admit(&mut reg, "bob").await;

        // The ban command itself is still delivered: alice is not banned
        reg.handle_broadcast(text_from(alice, "ban bob"));
        assert_eq!(rx_a.recv().await.unwrap().body, "ban bob");
        assert_eq!(rx_b.recv().await.unwrap().body, "ban bob");

        // Suppressed for everyone, bob included
        reg.handle_broadcast(text_from(bob, "can anyone hear me"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());

        // Any sender may lift the ban
        reg.handle_broadcast(text_from(alice, "unban bob"));
        assert_eq!(rx_a.recv().await.unwrap().body, "unban bob");
        assert_eq!(rx_b.recv().await.unwrap().body, "unban bob");

        reg.handle_broadcast(text_from(bob, "back again"));
        assert_eq!(rx_a.recv().await.unwrap().body, "back again");
        assert_eq!(rx_b.recv().await.unwrap().body, "back again");
    }

    #[tokio::test]
    async fn self_ban_suppresses_the_command_message_itself() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;
        let (_bob, mut rx_b) = admit(&mut reg, "bob").await;

        // The ban lands before the fan-out, so the command never arrives
        reg.handle_broadcast(text_from(alice, "ban alice"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert!(reg.banned.contains("alice"));
    }

    #[tokio::test]
    async fn banned_name_can_still_connect() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;

        reg.handle_broadcast(text_from(alice, "ban bob"));
        rx_a.recv().await.unwrap();

        // Ban blocks delivery, not admission
        let (bob, mut rx_b) = admit(&mut reg, "bob").await;
        reg.handle_broadcast(text_from(bob, "am I live"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_broadcasts_notice_to_remaining_sessions() {
        let mut reg = new_registry();
        let (alice, _rx_a) = admit(&mut reg, "alice").await;
        let (_bob, mut rx_b) = admit(&mut reg, "bob").await;

        reg.handle_remove(alice);

        let notice = rx_b.recv().await.unwrap();
        assert_eq!(notice.sender_id, alice.as_u64());
        assert!(notice.body.contains("alice"));
        assert!(!reg.sessions_by_username.contains_key("alice"));
    }

    #[tokio::test]
    async fn remove_clears_ban_for_removed_username() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;
        let (bob, _rx_b) = admit(&mut reg, "bob").await;

        reg.handle_broadcast(text_from(alice, "ban bob"));
        rx_a.recv().await.unwrap();
        assert!(reg.banned.contains("bob"));

        reg.handle_remove(bob);
        assert!(reg.banned.is_empty());

        // Readmitted under the same name, messages flow again
        let (bob2, mut rx_b2) = admit(&mut reg, "bob").await;
        reg.handle_broadcast(text_from(bob2, "reborn"));
        assert_eq!(rx_b2.recv().await.unwrap().body, "reborn");
    }

    #[tokio::test]
    async fn removal_notice_for_banned_user_is_suppressed() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;
        let (bob, _rx_b) = admit(&mut reg, "bob").await;

        reg.handle_broadcast(text_from(alice, "ban bob"));
        rx_a.recv().await.unwrap();

        // The notice's originator is bob, who is banned at that instant
        reg.handle_remove(bob);
        assert!(rx_a.try_recv().is_err());
        assert!(!reg.usernames_by_id.contains_key(&bob));
    }

    #[tokio::test]
    async fn remove_unknown_id_is_a_noop() {
        let mut reg = new_registry();
        let (_alice, mut rx_a) = admit(&mut reg, "alice").await;

        reg.handle_remove(SessionId(999));

        assert!(rx_a.try_recv().is_err());
        assert_eq!(reg.sessions_by_username.len(), 1);
    }

    #[tokio::test]
    async fn ban_and_unban_are_idempotent() {
        let mut reg = new_registry();

        reg.ban("bob");
        reg.ban("bob");
        assert_eq!(reg.banned.len(), 1);

        reg.unban("bob");
        reg.unban("bob");
        assert!(reg.banned.is_empty());
    }

    #[tokio::test]
    async fn maps_stay_a_consistent_bijection() {
        let mut reg = new_registry();
        let (alice, _rx_a) = admit(&mut reg, "alice").await;
        let (_bob, _rx_b) = admit(&mut reg, "bob").await;
        let (_carol, _rx_c) = admit(&mut reg, "carol").await;
        reg.handle_remove(alice);

        assert_eq!(reg.sessions_by_username.len(), reg.usernames_by_id.len());
        for (id, name) in &reg.usernames_by_id {
            let handle = reg.sessions_by_username.get(name).unwrap();
            assert_eq!(handle.id, *id);
            assert_eq!(handle.username, *name);
        }
    }

    #[tokio::test]
    async fn shutdown_stops_sessions_and_clears_state() {
        let mut reg = new_registry();
        let (alice, mut rx_a) = admit(&mut reg, "alice").await;
        reg.handle_broadcast(text_from(alice, "ban bob"));
        rx_a.recv().await.unwrap();

        reg.handle_shutdown();

        assert!(!reg.active);
        assert!(reg.sessions_by_username.is_empty());
        assert!(reg.usernames_by_id.is_empty());
        assert!(reg.banned.is_empty());
        // Handles dropped with the map: the session's queue is closed
        assert!(rx_a.recv().await.is_none());

        // Late admissions are turned away
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (reply_tx, reply_rx) = oneshot::channel();
        reg.handle_admit("dave".to_string(), tx, reply_tx);
        assert!(matches!(
            reply_rx.await.unwrap(),
            Err(AppError::RegistryClosed)
        ));
    }
}
