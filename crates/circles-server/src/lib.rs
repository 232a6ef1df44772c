//! circles-server: realtime presence and circle broadcast over WebSocket.
//!
//! Authenticated users are bound to a single live connection, placed in the
//! circles they belong to, and receive membership, typing and message events
//! for those circles. Code outside the frame flow pushes to online users
//! through [`presence::NotificationBridge`].

pub mod auth;
pub mod config;
pub mod connection;
pub mod context;
pub mod presence;
pub mod server;
pub mod store;
pub mod transport;

pub use config::{CliOverrides, ServerConfig};
pub use connection::{ConnState, Connection};
pub use context::ServerContext;
pub use presence::{FriendEvent, NotificationBridge, Presence};
pub use server::{CircleServer, ListeningServer, ShutdownHandle};
pub use store::{CircleStore, MemoryStore};
