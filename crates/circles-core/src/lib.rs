//! circles-core: shared protocol library for circles presence.
//!
//! Provides the inbound/outbound frame types, JSON text codec, the error
//! taxonomy reported back to clients, and HS256 access-token verification.

pub mod codec;
pub mod error;
pub mod messages;
pub mod token;

// Re-export commonly used items at crate root.
pub use codec::{decode_frame, encode_frame, parse_envelope};
pub use error::{CircleError, CircleResult};
pub use messages::{ClientFrame, MessagePayload, Notification, PublicUser, RawFrame, ServerFrame};
pub use token::{create_access_token, verify_access_token, AccessClaims};
