//! The process-wide authentication session store.

use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{ActiveSession, AuthState, AuthenticatedUser, SessionEndReason, SessionGrant};

/// Notified when an authenticated session ends.
///
/// Implementations must not call back into the store that notifies them.
pub trait SessionObserver: Send + Sync {
    fn on_session_ended(&self, reason: SessionEndReason);
}

/// Holds the authentication state and fans out session-end notifications.
#[derive(Default)]
pub struct AuthSessionStore {
    state: RwLock<AuthState>,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
}

impl AuthSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for logout and expiry.
    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(observer);
    }

    /// Establishes a session from a successful login.
    ///
    /// Logging in over an existing session replaces it and notifies observers
    /// that the previous one ended, so nothing cached for the previous user
    /// survives.
    pub fn login(&self, grant: SessionGrant) -> Result<()> {
        grant.validate()?;
        let user_id = grant.user.id.clone();

        let previous = self.replace_state(AuthState::Authenticated(grant.into()));
        if let AuthState::Authenticated(previous) = previous {
            debug!("Replacing session of user {}", previous.user.id);
            self.notify(SessionEndReason::Logout);
        }

        info!("User {} logged in", user_id);
        Ok(())
    }

    /// Re-establishes a persisted session.
    ///
    /// Observers are notified only when this replaces a different live
    /// session; restoring into an empty store or over the same session is
    /// silent.
    pub fn restore(&self, session: ActiveSession) {
        debug!("Restoring session for user {}", session.user.id);
        let (user_id, token) = (session.user.id.clone(), session.access_token.clone());
        let previous = self.replace_state(AuthState::Authenticated(session));
        if let AuthState::Authenticated(previous) = previous {
            if previous.user.id != user_id || previous.access_token != token {
                debug!("Restored session replaces that of user {}", previous.user.id);
                self.notify(SessionEndReason::Logout);
            }
        }
    }

    /// Signs the user out.
    pub fn logout(&self) {
        self.end(SessionEndReason::Logout);
    }

    /// Ends the session after the backend rejected our credentials.
    pub fn expire(&self) {
        self.end(SessionEndReason::Expired);
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated()
    }

    /// A copy of the current state.
    pub fn state(&self) -> AuthState {
        self.read_state().clone()
    }

    pub fn current_session(&self) -> Option<ActiveSession> {
        match &*self.read_state() {
            AuthState::Authenticated(session) => Some(session.clone()),
            AuthState::Unauthenticated => None,
        }
    }

    pub fn current_user(&self) -> Option<AuthenticatedUser> {
        self.read_state().user().cloned()
    }

    pub fn user_id(&self) -> Option<String> {
        self.read_state().user_id().map(str::to_string)
    }

    pub fn access_token(&self) -> Option<String> {
        match &*self.read_state() {
            AuthState::Authenticated(session) => Some(session.access_token.clone()),
            AuthState::Unauthenticated => None,
        }
    }

    fn end(&self, reason: SessionEndReason) {
        let previous = self.replace_state(AuthState::Unauthenticated);
        match previous {
            AuthState::Authenticated(session) => {
                match reason {
                    SessionEndReason::Logout => info!("User {} logged out", session.user.id),
                    SessionEndReason::Expired => {
                        warn!("Session for user {} expired", session.user.id)
                    }
                }
                self.notify(reason);
            }
            AuthState::Unauthenticated => {
                debug!("Session end ({}) ignored: not authenticated", reason);
            }
        }
    }

    fn notify(&self, reason: SessionEndReason) {
        // Clone the list so observers run without the lock held.
        let observers: Vec<Arc<dyn SessionObserver>> = self
            .observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        debug!("Notifying {} session observers ({})", observers.len(), reason);
        for observer in observers {
            observer.on_session_ended(reason);
        }
    }

    fn replace_state(&self, next: AuthState) -> AuthState {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *state, next)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, AuthState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
