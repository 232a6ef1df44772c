//! Frame fan-out to live sessions.
//!
//! Callers hold the presence lock while these run, so the member set and
//! the target handles cannot change mid-broadcast. Delivery is a
//! non-blocking enqueue; absent or closed sessions are skipped silently.

use super::registry::SessionRegistry;
use super::rooms::RoomIndex;
use circles_core::encode_frame;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Serialize a payload once for every recipient.
pub fn serialize<T: Serialize>(payload: &T) -> Option<Arc<str>> {
    match encode_frame(payload) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(error = %e, "failed to serialize frame");
            None
        }
    }
}

/// Deliver `text` to every member of `room_id` not listed in `exclude`.
///
/// Members are visited in the room index's iteration order. Returns the
/// number of sessions the frame was queued to.
pub fn fan_out(
    sessions: &SessionRegistry,
    rooms: &RoomIndex,
    room_id: &str,
    text: &Arc<str>,
    exclude: &[&str],
) -> usize {
    let mut delivered = 0;
    let mut skipped = 0;
    for user_id in rooms.members(room_id) {
        if exclude.contains(&user_id.as_str()) {
            continue;
        }
        if deliver(sessions, user_id, text) {
            delivered += 1;
        } else {
            skipped += 1;
        }
    }
    debug!(room_id = %room_id, delivered, skipped, "room broadcast");
    delivered
}

/// Deliver `text` to a single user if they have a live session.
pub fn deliver(sessions: &SessionRegistry, user_id: &str, text: &Arc<str>) -> bool {
    let Some(session) = sessions.get(user_id) else {
        return false;
    };
    if !session.handle.is_open() {
        return false;
    }
    if session.handle.deliver(Arc::clone(text)) {
        true
    } else {
        warn!(
            user_id = %user_id,
            conn_id = session.handle.id(),
            "outbound queue full, frame dropped"
        );
        false
    }
}
