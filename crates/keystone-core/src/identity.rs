//! Caller identity.
//!
//! An [`Identity`] is resolved once per request from the credential header
//! and never mutated afterwards. An identity without a user is anonymous.

use serde::{Deserialize, Serialize};

/// A user record as loaded from the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier.
    pub id: String,
    /// Primary email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Whether the user may call admin-only endpoints.
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Creates a non-admin user.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: String::new(),
            is_admin: false,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Marks the user as an administrator.
    #[must_use]
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// A login session owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier presented by the client.
    pub id: String,
    /// Owner of the session.
    pub user_id: String,
}

impl Session {
    /// Creates a session record.
    #[must_use]
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
        }
    }
}

/// The resolved caller of a request.
///
/// # Example
///
/// ```
/// use keystone_core::{Identity, Session, User};
///
/// let anon = Identity::anonymous();
/// assert!(anon.is_anonymous());
///
/// let user = User::new("u1", "ada@example.com");
/// let identity = Identity::new(user, Session::new("s1", "u1"));
/// assert_eq!(identity.user_id(), Some("u1"));
/// assert_eq!(identity.log_id(), "user:u1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The authenticated user, `None` when anonymous.
    pub user: Option<User>,
    /// The session the user authenticated with.
    pub session: Option<Session>,
}

impl Identity {
    /// Creates an identity for a user and their session.
    #[must_use]
    pub fn new(user: User, session: Session) -> Self {
        Self {
            user: Some(user),
            session: Some(session),
        }
    }

    /// Creates an anonymous identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns the user ID, treating an empty ID as absent.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|u| u.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Returns `true` if there is no user, or the user carries no ID.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.user_id().is_none()
    }

    /// Returns `true` if the user has the admin flag.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_admin)
    }

    /// Returns a string suitable for logs. Never includes session IDs.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self.user_id() {
            Some(id) => format!("user:{id}"),
            None => "anonymous".to_string(),
        }
    }
}
