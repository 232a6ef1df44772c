//! Session registry: one live connection per authenticated user.
//!
//! Last authenticate wins. Replacing a session hands the previous entry back
//! to the caller, who is responsible for closing its connection.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Server-assigned connection identifier, unique for the process lifetime.
pub type ConnId = u64;

/// Identifier handed out for each registered session.
pub type SessionId = String;

/// Close code sent to a connection whose session was taken over.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// Commands queued to a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A serialized JSON frame.
    Text(Arc<str>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Send a close frame and stop writing.
    Close { code: u16, reason: String },
}

/// Sending side of one live transport connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(id: ConnId, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Whether the writer side is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a frame without waiting. Returns `false` if the connection is
    /// gone or its queue is full.
    pub fn deliver(&self, text: Arc<str>) -> bool {
        self.tx.try_send(Outbound::Text(text)).is_ok()
    }

    pub fn send_raw(&self, msg: Outbound) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Ask the writer to close the transport.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.tx
            .try_send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .is_ok()
    }
}

/// One live, authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: String,
    pub email: String,
    pub handle: ConnectionHandle,
    /// Rooms this session participates in. Mirrors the room index.
    pub joined_rooms: BTreeSet<String>,
    pub connected_at: Instant,
}

/// Maps user id to its single live session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `user_id`, replacing any existing one.
    ///
    /// Returns the new session id and the replaced session, if any. The
    /// replaced session's connection is left untouched.
    pub fn register(
        &mut self,
        user_id: &str,
        email: &str,
        handle: ConnectionHandle,
    ) -> (SessionId, Option<Session>) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let conn_id = handle.id();
        let session = Session {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            handle,
            joined_rooms: BTreeSet::new(),
            connected_at: Instant::now(),
        };
        let replaced = self.sessions.insert(user_id.to_string(), session);
        info!(
            user_id = %user_id,
            conn_id,
            replaced = replaced.is_some(),
            "session registered"
        );
        (session_id, replaced)
    }

    pub fn get(&self, user_id: &str) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    /// Remove the session for `user_id`. Idempotent.
    pub fn remove(&mut self, user_id: &str) -> Option<Session> {
        let removed = self.sessions.remove(user_id);
        if removed.is_some() {
            debug!(user_id = %user_id, "session removed");
        }
        removed
    }

    /// Remove the session for `user_id` only if it is bound to `conn_id`.
    ///
    /// A connection that was superseded must not tear down its successor.
    pub fn remove_connection(&mut self, user_id: &str, conn_id: ConnId) -> Option<Session> {
        match self.sessions.get(user_id) {
            Some(s) if s.handle.id() == conn_id => self.remove(user_id),
            _ => None,
        }
    }

    /// Whether `user_id` is currently bound to `conn_id`.
    pub fn is_bound(&self, user_id: &str, conn_id: ConnId) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|s| s.handle.id() == conn_id)
    }

    /// No-op if the session is absent.
    pub fn add_room(&mut self, user_id: &str, room_id: &str) {
        if let Some(s) = self.sessions.get_mut(user_id) {
            s.joined_rooms.insert(room_id.to_string());
        }
    }

    /// No-op if the session is absent.
    pub fn remove_room(&mut self, user_id: &str, room_id: &str) {
        if let Some(s) = self.sessions.get_mut(user_id) {
            s.joined_rooms.remove(room_id);
        }
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }
}
