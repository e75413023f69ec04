//! Session tracking and best-effort broadcast fan-out
//!
//! This module handles the server-side management of connected clients:
//! - Role attribution (one admin slot, one public-display slot, any number
//!   of players)
//! - Replacement of superseded exclusive-role connections, actively closing
//!   the old channel instead of leaking it
//! - Serialize-once fan-out with per-recipient failure isolation
//!
//! Senders are plain channels of serialized frames; the network layer owns
//! the actual sockets. A dropped sender closes the peer's send loop, which
//! is how superseded and swept sessions get disconnected.

use log::{error, info, warn};
use shared::{Role, ServerMessage};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Outbound handle for one connection: serialized JSON frames, forwarded to
/// the socket by the connection's send task.
pub type Outbound = UnboundedSender<String>;

/// A connected client tagged with the role it declared at connect time.
#[derive(Debug)]
struct Session {
    id: u64,
    role: Role,
    tx: Outbound,
}

/// Tracks every live session and fans broadcasts out to them.
///
/// Admin and public are exclusive slots: registering a second connection of
/// either role replaces the stored one and closes the superseded channel.
/// Player sessions accumulate keyed by session id.
pub struct SessionRegistry {
    admin: Option<Session>,
    public: Option<Session>,
    players: HashMap<u64, Session>,
    next_session_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            admin: None,
            public: None,
            players: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Registers a connection under its role and returns its session id.
    ///
    /// A superseded admin/public connection stops receiving broadcasts the
    /// moment it is replaced; dropping its sender here also ends its send
    /// loop so the socket actually closes.
    pub fn register(&mut self, role: Role, tx: Outbound) -> u64 {
        let id = self.next_session_id;
        self.next_session_id += 1;

        let session = Session { id, role, tx };
        match role {
            Role::Admin => {
                if let Some(old) = self.admin.replace(session) {
                    info!("Admin session {} replaced by session {}", old.id, id);
                }
            }
            Role::Public => {
                if let Some(old) = self.public.replace(session) {
                    info!("Public session {} replaced by session {}", old.id, id);
                }
            }
            Role::Player => {
                self.players.insert(id, session);
            }
        }

        info!("Session {} connected as {}", id, role);
        id
    }

    /// Removes a session from whichever role container holds it. Safe to
    /// call for already-replaced or unknown ids.
    pub fn unregister(&mut self, id: u64) {
        let removed = if self.admin.as_ref().map_or(false, |s| s.id == id) {
            self.admin = None;
            true
        } else if self.public.as_ref().map_or(false, |s| s.id == id) {
            self.public = None;
            true
        } else {
            self.players.remove(&id).is_some()
        };

        if removed {
            info!("Session {} disconnected", id);
        }
    }

    /// Serializes once and attempts delivery to every live session. A
    /// failed send is logged and skipped; it never aborts the fan-out.
    /// Dead sessions are swept afterwards.
    pub fn broadcast(&mut self, message: &ServerMessage) {
        let Some(frame) = serialize(message) else {
            return;
        };

        let mut dead = Vec::new();
        for session in self.iter_sessions() {
            if session.tx.send(frame.clone()).is_err() {
                error!(
                    "Failed to deliver to {} session {}",
                    session.role, session.id
                );
                dead.push(session.id);
            }
        }

        for id in dead {
            self.unregister(id);
        }
    }

    /// Sends one message to the admin slot only. Used for order
    /// notifications that are nobody else's business.
    pub fn send_to_admin(&mut self, message: &ServerMessage) {
        let Some(frame) = serialize(message) else {
            return;
        };

        let failed = match &self.admin {
            Some(admin) => {
                if admin.tx.send(frame).is_err() {
                    Some(admin.id)
                } else {
                    None
                }
            }
            None => {
                warn!("No admin session connected; dropping admin notification");
                None
            }
        };

        if let Some(id) = failed {
            error!("Failed to deliver to admin session {}", id);
            self.unregister(id);
        }
    }

    /// Sends one message to a specific session, e.g. the snapshot pushed at
    /// registration time.
    pub fn send_to(&mut self, id: u64, message: &ServerMessage) {
        let Some(frame) = serialize(message) else {
            return;
        };

        let found = self
            .iter_sessions()
            .find(|session| session.id == id)
            .map(|session| session.tx.send(frame).is_ok());

        match found {
            Some(true) => {}
            Some(false) => {
                error!("Failed to deliver to session {}", id);
                self.unregister(id);
            }
            None => warn!("Dropping message for unknown session {}", id),
        }
    }

    fn iter_sessions(&self) -> impl Iterator<Item = &Session> {
        self.admin
            .iter()
            .chain(self.public.iter())
            .chain(self.players.values())
    }

    pub fn len(&self) -> usize {
        self.admin.iter().count() + self.public.iter().count() + self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to serialize broadcast: {}", e);
            None
        }
    }
}
