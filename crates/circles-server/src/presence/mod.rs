//! Presence core: who is online, which circles they are in, and fan-out.
//!
//! [`Presence`] owns the session registry and the room index behind a single
//! lock. Every mutation and every broadcast-targeting read happens under that
//! lock, so a broadcast never races a join, leave or disconnect.

pub mod bridge;
pub mod broadcast;
pub mod registry;
pub mod rooms;

pub use bridge::{FriendEvent, NotificationBridge};
pub use registry::{
    ConnId, ConnectionHandle, Outbound, Session, SessionId, SessionRegistry, CLOSE_SUPERSEDED,
};
pub use rooms::RoomIndex;

use circles_core::ServerFrame;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct PresenceState {
    sessions: SessionRegistry,
    rooms: RoomIndex,
}

impl PresenceState {
    fn enter(&mut self, user_id: &str, room_id: &str) {
        self.rooms.join(room_id, user_id);
        self.sessions.add_room(user_id, room_id);
    }

    fn exit(&mut self, user_id: &str, room_id: &str) -> bool {
        self.sessions.remove_room(user_id, room_id);
        self.rooms.leave(room_id, user_id)
    }

    fn announce<T: Serialize>(&self, room_id: &str, payload: &T, exclude: &[&str]) -> usize {
        match broadcast::serialize(payload) {
            Some(text) => broadcast::fan_out(&self.sessions, &self.rooms, room_id, &text, exclude),
            None => 0,
        }
    }
}

/// Process-wide presence state.
#[derive(Debug)]
pub struct Presence {
    state: Mutex<PresenceState>,
    next_conn_id: AtomicU64,
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

impl Presence {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PresenceState::default()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a freshly accepted connection.
    pub fn next_connection_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind `user_id` to `handle` and place it in `circles`.
    ///
    /// A previous session for the same user is replaced: rooms it held that
    /// are not in `circles` are retracted (with `user-left-circle`
    /// notifications), and if it lived on a different connection that
    /// connection is asked to close.
    pub async fn establish(
        &self,
        user_id: &str,
        email: &str,
        handle: ConnectionHandle,
        circles: &[String],
    ) -> SessionId {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let conn_id = handle.id();

        let (session_id, replaced) = st.sessions.register(user_id, email, handle);

        if let Some(old) = replaced {
            for room in old.joined_rooms.iter().filter(|r| !circles.contains(*r)) {
                st.rooms.leave(room, user_id);
                st.announce(room, &ServerFrame::user_left(user_id, room), &[user_id]);
            }
            if old.handle.id() != conn_id {
                if !old.handle.close(CLOSE_SUPERSEDED, "session superseded") {
                    warn!(
                        user_id = %user_id,
                        old_conn = old.handle.id(),
                        "superseded connection did not accept close"
                    );
                }
                info!(
                    user_id = %user_id,
                    old_conn = old.handle.id(),
                    new_conn = conn_id,
                    "superseded session closed"
                );
            }
        }

        for circle in circles {
            st.enter(user_id, circle);
        }
        debug!(user_id = %user_id, circles = circles.len(), "session joined circles");

        session_id
    }

    /// Tear down the session bound to `conn_id`, leaving every room it was in
    /// and telling the remaining members. Returns the rooms left.
    ///
    /// Does nothing if the user's session now belongs to another connection.
    pub async fn disconnect(&self, user_id: &str, conn_id: ConnId) -> Vec<String> {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;

        let Some(session) = st.sessions.remove_connection(user_id, conn_id) else {
            return Vec::new();
        };

        let duration_secs = session.connected_at.elapsed().as_secs();
        let rooms: Vec<String> = session.joined_rooms.into_iter().collect();
        for room in &rooms {
            st.rooms.leave(room, user_id);
            st.announce(room, &ServerFrame::user_left(user_id, room), &[user_id]);
        }
        info!(
            user_id = %user_id,
            conn_id,
            rooms = rooms.len(),
            duration_secs,
            "session disconnected"
        );
        rooms
    }

    /// Join a circle on behalf of the session bound to `conn_id` and announce
    /// it to the other members. Returns `false` if that session is gone.
    pub async fn join_circle(&self, user_id: &str, conn_id: ConnId, circle_id: &str) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;

        if !st.sessions.is_bound(user_id, conn_id) {
            return false;
        }
        st.enter(user_id, circle_id);
        st.announce(circle_id, &ServerFrame::user_joined(user_id, circle_id), &[user_id]);
        true
    }

    /// Leave a circle and announce it. No membership check is made; returns
    /// `false` only if the session bound to `conn_id` is gone.
    pub async fn leave_circle(&self, user_id: &str, conn_id: ConnId, circle_id: &str) -> bool {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;

        if !st.sessions.is_bound(user_id, conn_id) {
            return false;
        }
        let was_present = st.exit(user_id, circle_id);
        st.announce(circle_id, &ServerFrame::user_left(user_id, circle_id), &[user_id]);
        debug!(user_id = %user_id, circle_id = %circle_id, was_present, "left circle");
        true
    }

    /// Whether `user_id`'s session is still the one on `conn_id`.
    pub async fn is_bound(&self, user_id: &str, conn_id: ConnId) -> bool {
        self.state.lock().await.sessions.is_bound(user_id, conn_id)
    }

    /// Broadcast on behalf of the session bound to `conn_id`. Returns `None`
    /// without delivering anything if that session has been superseded.
    pub async fn broadcast_from<T: Serialize>(
        &self,
        user_id: &str,
        conn_id: ConnId,
        room_id: &str,
        payload: &T,
        exclude: &[&str],
    ) -> Option<usize> {
        let guard = self.state.lock().await;
        if !guard.sessions.is_bound(user_id, conn_id) {
            return None;
        }
        Some(guard.announce(room_id, payload, exclude))
    }

    /// Deliver `payload` to every live member of `room_id` except `exclude`.
    pub async fn broadcast_to_room<T: Serialize>(
        &self,
        room_id: &str,
        payload: &T,
        exclude: &[&str],
    ) -> usize {
        let guard = self.state.lock().await;
        guard.announce(room_id, payload, exclude)
    }

    /// Deliver `payload` to `user_id` if they are online.
    pub async fn send_to_user<T: Serialize>(&self, user_id: &str, payload: &T) -> bool {
        let Some(text) = broadcast::serialize(payload) else {
            return false;
        };
        let guard = self.state.lock().await;
        broadcast::deliver(&guard.sessions, user_id, &text)
    }

    pub async fn session(&self, user_id: &str) -> Option<Session> {
        self.state.lock().await.sessions.get(user_id).cloned()
    }

    pub async fn members_of(&self, room_id: &str) -> BTreeSet<String> {
        self.state.lock().await.rooms.members_of(room_id)
    }

    /// Number of non-empty rooms currently indexed.
    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.room_count()
    }

    pub async fn online_users(&self) -> Vec<String> {
        let mut users = self.state.lock().await.sessions.user_ids();
        users.sort();
        users
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.state.lock().await.sessions.get(user_id).is_some()
    }
}
