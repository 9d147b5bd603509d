//! File-backed persistence of the active session.
//!
//! Lets a session survive process restarts. The file holds the access token;
//! on unix it is written with mode 0600.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{AuthSessionStore, SessionObserver};
use crate::types::{ActiveSession, SessionEndReason};

/// A JSON file holding at most one [`ActiveSession`].
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the session, creating parent directories as needed.
    pub fn save(&self, session: &ActiveSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(session)?;
        fs::write(&self.path, bytes)?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }
        debug!("Session saved to {:?}", self.path);
        Ok(())
    }

    /// Reads the session; `Ok(None)` when no file exists.
    pub fn load(&self) -> Result<Option<ActiveSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Removes the file. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        info!("Removed session file {:?}", self.path);
        Ok(true)
    }
}

/// Removes the stored session whenever the live one ends, so an expired
/// token is not restored on the next start.
impl SessionObserver for SessionFile {
    fn on_session_ended(&self, reason: SessionEndReason) {
        if let Err(e) = self.clear() {
            warn!("Failed to remove session file {:?} after {}: {}", self.path, reason, e);
        }
    }
}

impl AuthSessionStore {
    /// Restores a session from `file` if one is stored there.
    ///
    /// A missing or unreadable file leaves the store unauthenticated. Returns
    /// whether a session was restored.
    pub fn restore_from(&self, file: &SessionFile) -> bool {
        match file.load() {
            Ok(Some(session)) => {
                self.restore(session);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Ignoring unreadable session file {:?}: {}", file.path(), e);
                false
            }
        }
    }

    /// Writes the current session to `file`, or removes the file when signed out.
    pub fn persist_to(&self, file: &SessionFile) -> Result<()> {
        match self.current_session() {
            Some(session) => file.save(&session),
            None => file.clear().map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthenticatedUser, SessionGrant};
    use tempfile::TempDir;

    fn grant() -> SessionGrant {
        SessionGrant::new("token-1", AuthenticatedUser::new("u1", "ana", "ana@example.com"))
            .with_refresh_token("refresh-1")
    }

    #[test]
    fn test_save_and_restore_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let file = SessionFile::new(temp_dir.path().join("nested").join("session.json"));

        let store = AuthSessionStore::new();
        store.login(grant()).unwrap();
        store.persist_to(&file).unwrap();

        let restored = AuthSessionStore::new();
        assert!(restored.restore_from(&file));
        assert_eq!(restored.current_session(), store.current_session());
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = AuthSessionStore::new();
        store.login(grant()).unwrap();
        store.persist_to(&SessionFile::new(&path)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_persist_when_signed_out_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = SessionFile::new(temp_dir.path().join("session.json"));

        let store = AuthSessionStore::new();
        store.login(grant()).unwrap();
        store.persist_to(&file).unwrap();
        assert!(file.path().exists());

        store.logout();
        store.persist_to(&file).unwrap();
        assert!(!file.path().exists());
    }

    #[test]
    fn test_missing_file_restores_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let file = SessionFile::new(temp_dir.path().join("absent.json"));

        let store = AuthSessionStore::new();
        assert!(!store.restore_from(&file));
        assert!(!store.is_authenticated());
        assert!(!file.clear().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = AuthSessionStore::new();
        assert!(!store.restore_from(&SessionFile::new(&path)));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_expiry_removes_file_when_subscribed() {
        let temp_dir = TempDir::new().unwrap();
        let file = std::sync::Arc::new(SessionFile::new(temp_dir.path().join("session.json")));

        let store = AuthSessionStore::new();
        store.subscribe(file.clone());
        store.login(grant()).unwrap();
        store.persist_to(&file).unwrap();

        store.expire();
        assert!(!file.path().exists());
    }
}
