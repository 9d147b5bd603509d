//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SessionError};

/// The identity of the signed-in user.
///
/// Owned by the session store. Other subsystems read it (usually just the
/// id) and never mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            display_name: None,
        }
    }

    /// Name to show in the UI, falling back to the username.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// What the backend hands out on a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthenticatedUser,
}

impl SessionGrant {
    pub fn new(access_token: impl Into<String>, user: AuthenticatedUser) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(SessionError::InvalidGrant("access token is empty".to_string()));
        }
        if self.user.id.trim().is_empty() {
            return Err(SessionError::InvalidGrant("user id is empty".to_string()));
        }
        Ok(())
    }
}

/// An established session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub user: AuthenticatedUser,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub authenticated_at: DateTime<Utc>,
}

impl From<SessionGrant> for ActiveSession {
    fn from(grant: SessionGrant) -> Self {
        Self {
            user: grant.user,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            authenticated_at: Utc::now(),
        }
    }
}

/// Authentication state of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    /// User is authenticated
    Authenticated(ActiveSession),
    /// User is not authenticated
    #[default]
    Unauthenticated,
}

impl AuthState {
    /// Check if the user is authenticated
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    /// Get the authenticated user if available
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            AuthState::Authenticated(session) => Some(&session.user),
            AuthState::Unauthenticated => None,
        }
    }

    /// Get the user ID if authenticated
    pub fn user_id(&self) -> Option<&str> {
        self.user().map(|u| u.id.as_str())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEndReason {
    /// The user signed out.
    Logout,
    /// An API call reported the session as no longer valid (HTTP 401).
    Expired,
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEndReason::Logout => write!(f, "logout"),
            SessionEndReason::Expired => write!(f, "expired"),
        }
    }
}
