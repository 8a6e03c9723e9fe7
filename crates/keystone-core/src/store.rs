//! Session storage boundary.
//!
//! Identity resolution needs exactly two lookups: a session by its ID and a
//! user by theirs. Concrete stores (SQL, cache, remote identity provider)
//! implement [`SessionStore`]; [`MemorySessionStore`] is an in-process store
//! for tests and small deployments.

use crate::error::AppResult;
use crate::identity::{Session, User};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read-mostly store consulted during identity resolution.
///
/// Implementations must be safe for concurrent reads. Returning `Ok(None)`
/// means "does not exist"; errors are reserved for storage failures.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Looks up a session by ID.
    async fn find_session(&self, session_id: &str) -> AppResult<Option<Session>>;

    /// Looks up a user by ID.
    async fn find_user(&self, user_id: &str) -> AppResult<Option<User>>;
}

/// A [`SessionStore`] backed by in-memory maps.
///
/// # Example
///
/// ```
/// use keystone_core::{MemorySessionStore, Session, User};
///
/// let store = MemorySessionStore::new();
/// store.insert_user(User::new("u1", "ada@example.com"));
/// store.insert_session(Session::new("s1", "u1"));
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    users: RwLock<HashMap<String, User>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert_user(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Adds or replaces a session.
    pub fn insert_session(&self, session: Session) {
        self.sessions.write().insert(session.id.clone(), session);
    }

    /// Removes a session, returning it if it existed.
    pub fn revoke_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.write().remove(session_id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_session(&self, session_id: &str) -> AppResult<Option<Session>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn find_user(&self, user_id: &str) -> AppResult<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }
}
