//! External store collaborator.
//!
//! Users, circles, memberships and messages are owned by the application's
//! relational store. The presence server only needs the handful of queries
//! below; [`MemoryStore`] provides them in-process for development and tests.

pub mod memory;

pub use memory::{MemoryStore, SeedFile};

use async_trait::async_trait;
use circles_core::{CircleResult, MessagePayload, PublicUser};

/// Circles created at startup when `store.default_circles` is enabled.
pub const DEFAULT_CIRCLES: &[(&str, &str)] = &[
    (
        "joyfulSouls",
        "A community for happy souls to share joy and positive vibes",
    ),
    (
        "creativeSouls",
        "Connect with creative minds and share your artistic journey",
    ),
    (
        "breakupSupport",
        "A supportive space for healing and moving forward after breakups",
    ),
    (
        "feelingRomantic",
        "Share romantic thoughts and experiences with like-minded people",
    ),
];

/// A user record as seen by the presence server.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_photo_url: Option<String>,
    pub is_active: bool,
}

impl StoreUser {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// A (user, circle) relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub user_id: String,
    pub circle_id: String,
    pub is_active: bool,
}

/// Queries the presence server issues against the external store.
///
/// Implementations return `Err(CircleError::Store(..))` when the backing
/// store is unreachable; absence is `Ok(None)`.
#[async_trait]
pub trait CircleStore: Send + Sync {
    async fn find_active_user_by_email(&self, email: &str) -> CircleResult<Option<StoreUser>>;

    /// Circle ids the user is an active member of.
    async fn list_active_memberships(&self, user_id: &str) -> CircleResult<Vec<String>>;

    async fn find_membership(
        &self,
        user_id: &str,
        circle_id: &str,
    ) -> CircleResult<Option<Membership>>;

    /// Persist a message and return it with denormalized author fields.
    async fn create_message(
        &self,
        user_id: &str,
        circle_id: &str,
        content: &str,
    ) -> CircleResult<MessagePayload>;

    /// Create the circle named `name` if it does not exist. Returns its id.
    async fn ensure_circle(&self, name: &str, description: &str) -> CircleResult<String>;
}

/// Upsert [`DEFAULT_CIRCLES`]. Idempotent.
pub async fn initialize_default_circles(store: &dyn CircleStore) -> CircleResult<Vec<String>> {
    let mut ids = Vec::with_capacity(DEFAULT_CIRCLES.len());
    for (name, description) in DEFAULT_CIRCLES {
        ids.push(store.ensure_circle(name, description).await?);
    }
    Ok(ids)
}
