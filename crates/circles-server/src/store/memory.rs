//! In-process store, optionally seeded from a TOML file.
//!
//! ```toml
//! [[circles]]
//! id = "general"
//! name = "general"
//!
//! [[users]]
//! name = "Ada"
//! email = "ada@example.com"
//! circles = ["general", "joyfulSouls"]
//! ```

use super::{CircleStore, Membership, StoreUser};
use async_trait::async_trait;
use chrono::Utc;
use circles_core::messages::MessageAuthor;
use circles_core::{CircleError, CircleResult, MessagePayload};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Seed file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub circles: Vec<SeedCircle>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCircle {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub profile_photo_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Circle names or ids the user is an active member of.
    #[serde(default)]
    pub circles: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl SeedFile {
    pub fn load(path: &Path) -> CircleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CircleError::Other(format!("seed parse error: {e}")))
    }
}

#[derive(Debug, Clone)]
struct Circle {
    name: String,
    #[allow(dead_code)]
    description: String,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, StoreUser>,
    circles: HashMap<String, Circle>,
    /// (user_id, circle_id) -> is_active
    memberships: HashMap<(String, String), bool>,
    messages: Vec<MessagePayload>,
}

impl Inner {
    fn circle_id_by_name(&self, name: &str) -> Option<String> {
        self.circles
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| id.clone())
    }

    fn insert_circle(&mut self, id: Option<String>, name: &str, description: &str) -> String {
        if let Some(existing) = self.circle_id_by_name(name) {
            return existing;
        }
        let id = id.unwrap_or_else(new_id);
        self.circles.insert(
            id.clone(),
            Circle {
                name: name.to_string(),
                description: description.to_string(),
            },
        );
        id
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A [`CircleStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a seed. Membership entries may name a circle by
    /// name or by id.
    pub fn from_seed(seed: SeedFile) -> CircleResult<Self> {
        let mut inner = Inner::default();

        for c in &seed.circles {
            inner.insert_circle(c.id.clone(), &c.name, &c.description);
        }

        for u in seed.users {
            let user = StoreUser {
                id: u.id.unwrap_or_else(new_id),
                name: u.name,
                email: u.email,
                profile_photo_url: u.profile_photo_url,
                is_active: u.active,
            };
            for circle in &u.circles {
                let circle_id = if inner.circles.contains_key(circle) {
                    circle.clone()
                } else {
                    inner.circle_id_by_name(circle).ok_or_else(|| {
                        CircleError::Other(format!("seed user {} references unknown circle {circle}", user.email))
                    })?
                };
                inner.memberships.insert((user.id.clone(), circle_id), true);
            }
            inner.users.insert(user.id.clone(), user);
        }

        info!(
            users = inner.users.len(),
            circles = inner.circles.len(),
            memberships = inner.memberships.len(),
            "memory store seeded"
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    pub async fn add_user(&self, user: StoreUser) {
        self.inner.write().await.users.insert(user.id.clone(), user);
    }

    pub async fn set_membership(&self, user_id: &str, circle_id: &str, is_active: bool) {
        self.inner
            .write()
            .await
            .memberships
            .insert((user_id.to_string(), circle_id.to_string()), is_active);
    }

    /// All persisted messages, oldest first.
    pub async fn messages(&self) -> Vec<MessagePayload> {
        self.inner.read().await.messages.clone()
    }
}

#[async_trait]
impl CircleStore for MemoryStore {
    async fn find_active_user_by_email(&self, email: &str) -> CircleResult<Option<StoreUser>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email == email && u.is_active)
            .cloned())
    }

    async fn list_active_memberships(&self, user_id: &str) -> CircleResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut circles: Vec<String> = inner
            .memberships
            .iter()
            .filter(|((uid, _), active)| uid == user_id && **active)
            .map(|((_, cid), _)| cid.clone())
            .collect();
        circles.sort();
        Ok(circles)
    }

    async fn find_membership(
        &self,
        user_id: &str,
        circle_id: &str,
    ) -> CircleResult<Option<Membership>> {
        let inner = self.inner.read().await;
        Ok(inner
            .memberships
            .get(&(user_id.to_string(), circle_id.to_string()))
            .map(|active| Membership {
                user_id: user_id.to_string(),
                circle_id: circle_id.to_string(),
                is_active: *active,
            }))
    }

    async fn create_message(
        &self,
        user_id: &str,
        circle_id: &str,
        content: &str,
    ) -> CircleResult<MessagePayload> {
        let mut inner = self.inner.write().await;
        let author = inner
            .users
            .get(user_id)
            .ok_or_else(|| CircleError::Store(format!("unknown author {user_id}")))?;

        let now = Utc::now();
        let message = MessagePayload {
            id: new_id(),
            content: content.to_string(),
            user_id: user_id.to_string(),
            circle_id: circle_id.to_string(),
            created_at: now,
            updated_at: now,
            user: MessageAuthor {
                id: author.id.clone(),
                name: author.name.clone(),
                email: author.email.clone(),
                profile_photo_url: author.profile_photo_url.clone(),
            },
        };
        inner.messages.push(message.clone());
        debug!(message_id = %message.id, circle_id = %circle_id, "message stored");
        Ok(message)
    }

    async fn ensure_circle(&self, name: &str, description: &str) -> CircleResult<String> {
        Ok(self.inner.write().await.insert_circle(None, name, description))
    }
}
