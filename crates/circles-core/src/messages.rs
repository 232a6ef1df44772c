//! Frame types exchanged over the circles presence connection.
//!
//! Inbound frames are first split into a [`RawFrame`] envelope (the `type`
//! tag plus the remaining fields) and only then validated into a
//! [`ClientFrame`]. The split lets the dispatcher reject unauthenticated
//! traffic before any per-type field is looked at.

use crate::error::{CircleError, CircleResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TYPE_AUTHENTICATE: &str = "authenticate";
pub const TYPE_JOIN_CIRCLE: &str = "join-circle";
pub const TYPE_LEAVE_CIRCLE: &str = "leave-circle";
pub const TYPE_SEND_MESSAGE: &str = "send-message";
pub const TYPE_TYPING: &str = "typing";

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Inbound ────────────────────────────────────────────────────────────

/// An inbound frame whose `type` is known to be a string but whose
/// remaining fields have not been validated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub kind: String,
    pub fields: Map<String, Value>,
}

impl RawFrame {
    pub fn is_authenticate(&self) -> bool {
        self.kind == TYPE_AUTHENTICATE
    }
}

/// A fully validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Authenticate { token: String },
    JoinCircle { circle_id: String },
    LeaveCircle { circle_id: String },
    SendMessage { circle_id: String, content: String },
    Typing { circle_id: String, is_typing: bool },
}

impl TryFrom<RawFrame> for ClientFrame {
    type Error = CircleError;

    fn try_from(raw: RawFrame) -> CircleResult<Self> {
        let f = &raw.fields;
        match raw.kind.as_str() {
            TYPE_AUTHENTICATE => {
                let token = match f.get("token") {
                    Some(Value::String(t)) if !t.trim().is_empty() => t.clone(),
                    _ => return Err(CircleError::validation("token", "Valid token required")),
                };
                Ok(Self::Authenticate { token })
            }
            TYPE_JOIN_CIRCLE => Ok(Self::JoinCircle {
                circle_id: circle_id(f)?,
            }),
            TYPE_LEAVE_CIRCLE => Ok(Self::LeaveCircle {
                circle_id: circle_id(f)?,
            }),
            TYPE_SEND_MESSAGE => {
                let circle_id = circle_id(f)?;
                let content = non_empty_str(f, "content")
                    .ok_or_else(|| CircleError::validation("content", "Message content required"))?;
                Ok(Self::SendMessage { circle_id, content })
            }
            TYPE_TYPING => {
                let circle_id = circle_id(f)?;
                let is_typing = f
                    .get("isTyping")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| CircleError::validation("isTyping", "isTyping must be boolean"))?;
                Ok(Self::Typing {
                    circle_id,
                    is_typing,
                })
            }
            _ => Err(CircleError::validation("type", "Invalid message type")),
        }
    }
}

fn non_empty_str(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn circle_id(fields: &Map<String, Value>) -> CircleResult<String> {
    non_empty_str(fields, "circleId")
        .ok_or_else(|| CircleError::validation("circleId", "Circle ID required"))
}

// ── Outbound ───────────────────────────────────────────────────────────

/// Public profile fields returned on successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Author fields denormalized into every message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAuthor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_photo_url: Option<String>,
}

/// A persisted chat message as broadcast to circle members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub circle_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: MessageAuthor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEvent {
    pub user_id: String,
    pub circle_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub user_id: String,
    pub circle_id: String,
    pub is_typing: bool,
}

/// Frames the server sends. The variant name is the wire `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    Authenticated {
        success: bool,
        user: PublicUser,
        timestamp: String,
    },
    JoinedCircle {
        success: bool,
        circle_id: String,
        timestamp: String,
    },
    LeftCircle {
        success: bool,
        circle_id: String,
        timestamp: String,
    },
    MessageSent {
        success: bool,
        message: MessagePayload,
        timestamp: String,
    },
    UserJoinedCircle {
        data: MembershipEvent,
    },
    UserLeftCircle {
        data: MembershipEvent,
    },
    NewMessage {
        data: MessagePayload,
    },
    UserTyping {
        data: TypingEvent,
    },
    ServerShutdown {
        reason: String,
        timestamp: String,
    },
    Error {
        success: bool,
        message: String,
        field: String,
        status: u16,
        timestamp: String,
    },
}

impl ServerFrame {
    pub fn authenticated(user: PublicUser) -> Self {
        Self::Authenticated {
            success: true,
            user,
            timestamp: now_timestamp(),
        }
    }

    pub fn joined_circle(circle_id: &str) -> Self {
        Self::JoinedCircle {
            success: true,
            circle_id: circle_id.to_string(),
            timestamp: now_timestamp(),
        }
    }

    pub fn left_circle(circle_id: &str) -> Self {
        Self::LeftCircle {
            success: true,
            circle_id: circle_id.to_string(),
            timestamp: now_timestamp(),
        }
    }

    pub fn message_sent(message: MessagePayload) -> Self {
        Self::MessageSent {
            success: true,
            message,
            timestamp: now_timestamp(),
        }
    }

    pub fn user_joined(user_id: &str, circle_id: &str) -> Self {
        Self::UserJoinedCircle {
            data: MembershipEvent {
                user_id: user_id.to_string(),
                circle_id: circle_id.to_string(),
            },
        }
    }

    pub fn user_left(user_id: &str, circle_id: &str) -> Self {
        Self::UserLeftCircle {
            data: MembershipEvent {
                user_id: user_id.to_string(),
                circle_id: circle_id.to_string(),
            },
        }
    }

    pub fn user_typing(user_id: &str, circle_id: &str, is_typing: bool) -> Self {
        Self::UserTyping {
            data: TypingEvent {
                user_id: user_id.to_string(),
                circle_id: circle_id.to_string(),
                is_typing,
            },
        }
    }

    pub fn shutdown(reason: &str) -> Self {
        Self::ServerShutdown {
            reason: reason.to_string(),
            timestamp: now_timestamp(),
        }
    }

    /// The uniform error envelope for any failure on the dispatch path.
    pub fn error_from(err: &CircleError) -> Self {
        Self::Error {
            success: false,
            message: err.client_message(),
            field: err.field().to_string(),
            status: err.status(),
            timestamp: now_timestamp(),
        }
    }
}

/// A push originating outside the frame dispatcher (friend requests etc.).
///
/// The event type is open-ended, so this is a plain struct rather than a
/// [`ServerFrame`] variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: String,
}

impl Notification {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: now_timestamp(),
        }
    }
}
