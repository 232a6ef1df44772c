//! Push entry point for code outside the frame dispatcher.
//!
//! HTTP-side services (friend requests, message creation over REST) use
//! [`NotificationBridge`] to reach online users without going through a
//! WebSocket frame. Offline targets are a silent no-op.

use super::Presence;
use circles_core::Notification;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Friend-request lifecycle events pushed to the affected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendEvent {
    RequestReceived,
    RequestAccepted,
    RequestRejected,
    FriendRemoved,
}

impl FriendEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReceived => "friend-request-received",
            Self::RequestAccepted => "friend-request-accepted",
            Self::RequestRejected => "friend-request-rejected",
            Self::FriendRemoved => "friend-removed",
        }
    }
}

impl fmt::Display for FriendEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloneable handle onto the shared presence state.
#[derive(Debug, Clone)]
pub struct NotificationBridge {
    presence: Arc<Presence>,
}

impl NotificationBridge {
    pub fn new(presence: Arc<Presence>) -> Self {
        Self { presence }
    }

    /// Send `{type: event_type, data, timestamp}` to one user.
    /// Returns whether the frame was queued.
    pub async fn notify_user(&self, user_id: &str, event_type: &str, data: Value) -> bool {
        let delivered = self
            .presence
            .send_to_user(user_id, &Notification::new(event_type, data))
            .await;
        debug!(user_id = %user_id, event_type, delivered, "user notification");
        delivered
    }

    pub async fn notify_friend_event(&self, user_id: &str, event: FriendEvent, data: Value) -> bool {
        self.notify_user(user_id, event.as_str(), data).await
    }

    /// Send `{type: event_type, data, timestamp}` to every member of a circle.
    /// Returns the number of recipients.
    pub async fn notify_circle(&self, circle_id: &str, event_type: &str, data: Value) -> usize {
        self.presence
            .broadcast_to_room(circle_id, &Notification::new(event_type, data), &[])
            .await
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.presence.is_online(user_id).await
    }

    pub async fn online_users(&self) -> Vec<String> {
        self.presence.online_users().await
    }
}
