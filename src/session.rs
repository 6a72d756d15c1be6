//! Session establishment and the client-persisted session record.
//!
//! The bearer token and user record issued after full authentication are
//! persisted together, as one unit, under a role-qualified key. The
//! [`SessionEstablisher`] is the single writer of that record; collaborator
//! screens (orders, cart, profile) read it through [`SessionEstablisher::current`]
//! and never write to it directly.
//!
//! # Tracing Events
//!
//! - `auth.session.established` - Session persisted after a successful flow
//! - `auth.session.cleared` - Session removed on logout

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// Which storefront surface a session belongs to.
///
/// Records for different roles never collide: each role has its own
/// storage key and its own guest identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
}

impl Role {
    /// The role-qualified storage key prefix.
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }
}

/// The long-lived bearer credential issued after full authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The user profile object returned by the backend alongside the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
}

/// Token, user record, and role, persisted atomically, never separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: SessionToken,
    pub user: UserRecord,
    pub role: Role,
}

/// Client-side persistence seam for the session record.
///
/// `persist` must be all-or-nothing: an error means nothing was written.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the record under its role-qualified key, atomically.
    async fn persist(&self, record: &SessionRecord) -> Result<()>;

    /// Load the record for a role, if one is persisted.
    async fn load(&self, role: Role) -> Result<Option<SessionRecord>>;

    /// Remove the record for a role.
    async fn clear(&self, role: Role) -> Result<()>;

    /// The role-qualified guest identifier, if one is set.
    async fn guest_id(&self, role: Role) -> Result<Option<String>>;

    /// Set the role-qualified guest identifier.
    async fn set_guest_id(&self, role: Role, id: &str) -> Result<()>;

    /// Remove the role-qualified guest identifier.
    async fn clear_guest_id(&self, role: Role) -> Result<()>;
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    async fn persist(&self, record: &SessionRecord) -> Result<()> {
        (**self).persist(record).await
    }

    async fn load(&self, role: Role) -> Result<Option<SessionRecord>> {
        (**self).load(role).await
    }

    async fn clear(&self, role: Role) -> Result<()> {
        (**self).clear(role).await
    }

    async fn guest_id(&self, role: Role) -> Result<Option<String>> {
        (**self).guest_id(role).await
    }

    async fn set_guest_id(&self, role: Role, id: &str) -> Result<()> {
        (**self).set_guest_id(role, id).await
    }

    async fn clear_guest_id(&self, role: Role) -> Result<()> {
        (**self).clear_guest_id(role).await
    }
}

/// In-memory session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<&'static str, SessionRecord>>,
    guest_ids: RwLock<HashMap<&'static str, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn persist(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(record.role.as_key(), record.clone());
        Ok(())
    }

    async fn load(&self, role: Role) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(role.as_key()).cloned())
    }

    async fn clear(&self, role: Role) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(role.as_key());
        Ok(())
    }

    async fn guest_id(&self, role: Role) -> Result<Option<String>> {
        let guest_ids = self.guest_ids.read().await;
        Ok(guest_ids.get(role.as_key()).cloned())
    }

    async fn set_guest_id(&self, role: Role, id: &str) -> Result<()> {
        let mut guest_ids = self.guest_ids.write().await;
        guest_ids.insert(role.as_key(), id.to_string());
        Ok(())
    }

    async fn clear_guest_id(&self, role: Role) -> Result<()> {
        let mut guest_ids = self.guest_ids.write().await;
        guest_ids.remove(role.as_key());
        Ok(())
    }
}

/// Single writer of the persisted session record.
#[derive(Clone)]
pub struct SessionEstablisher<S: SessionStore> {
    store: S,
}

impl<S: SessionStore> SessionEstablisher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a freshly issued session.
    ///
    /// The token and user record go in as one unit; if the store fails,
    /// the error propagates and the caller must not report success. For
    /// customer sessions the guest identifier is cleared afterwards; a
    /// failure there is logged but does not undo an established session.
    pub async fn establish(&self, record: SessionRecord) -> Result<SessionRecord> {
        self.store.persist(&record).await?;

        if record.role == Role::Customer {
            if let Err(e) = self.store.clear_guest_id(Role::Customer).await {
                tracing::warn!(
                    target: "auth.session.established",
                    error = %e,
                    "Failed to clear guest identifier"
                );
            }
        }

        tracing::info!(
            target: "auth.session.established",
            role = record.role.as_key(),
            user_id = %record.user.id,
            "Session established"
        );

        Ok(record)
    }

    /// Remove the persisted record for a role.
    pub async fn logout(&self, role: Role) -> Result<()> {
        self.store.clear(role).await?;
        tracing::info!(target: "auth.session.cleared", role = role.as_key(), "Session cleared");
        Ok(())
    }

    /// The persisted record for a role, if any. Read surface for
    /// collaborator screens.
    pub async fn current(&self, role: Role) -> Result<Option<SessionRecord>> {
        self.store.load(role).await
    }

    pub async fn is_authenticated(&self, role: Role) -> Result<bool> {
        Ok(self.current(role).await?.is_some())
    }
}
