//! Core permission model types.
//!
//! # Security Considerations
//!
//! A [`PermissionSnapshot`] is the client's view of what the backend granted
//! to the current user. It is never authoritative: the backend re-checks every
//! request. The snapshot exists to gate navigation and hide actions the user
//! cannot perform, so the model is built to fail closed:
//!
//! - The derived permission-name set can only be computed, never assigned
//! - Project ids compare by their string form so `5` and `"5"` match
//! - Duplicate project grants are rejected instead of silently merged

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::{AuthzError, Result};

/// A single named permission (e.g. `project.create`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
}

impl Permission {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A global role: a named bundle of permissions that applies everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(id: i64, name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            id,
            name: name.into(),
            permissions,
        }
    }

    /// Returns true if this role carries the named permission.
    pub fn grants(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == name)
    }
}

/// Identifier of a project, normalized to its string representation.
///
/// The backend sends numeric ids while route parameters arrive as strings.
/// Storing the string form makes `ProjectId::from(5) == ProjectId::from("5")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ProjectId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for ProjectId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for ProjectId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self(id.trim().to_string())
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self::from(id.as_str())
    }
}

impl From<&ProjectId> for ProjectId {
    fn from(id: &ProjectId) -> Self {
        id.clone()
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Signed(id) => ProjectId::from(id),
            RawId::Unsigned(id) => ProjectId::from(id),
            RawId::Text(id) => ProjectId::from(id),
        })
    }
}

/// The permissions a user holds inside one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGrant {
    pub project_id: ProjectId,
    pub permission_names: BTreeSet<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ProjectGrant {
    pub fn new<I, S>(project_id: impl Into<ProjectId>, permission_names: I, roles: Vec<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            project_id: project_id.into(),
            permission_names: permission_names.into_iter().map(Into::into).collect(),
            roles,
        }
    }
}

/// An immutable picture of the current user's permissions.
///
/// Built wholesale from one backend response and replaced as a unit. The
/// flattened [`all_permission_names`](Self::all_permission_names) set is
/// derived in the constructor and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSnapshot {
    global_roles: Vec<Role>,
    project_access: Vec<ProjectGrant>,
    all_permission_names: BTreeSet<String>,
    fetched_at: Option<DateTime<Utc>>,
}

impl PermissionSnapshot {
    /// Builds a snapshot, deriving the flattened name set.
    ///
    /// Fails if two grants name the same project.
    pub fn new(
        global_roles: Vec<Role>,
        project_access: Vec<ProjectGrant>,
        fetched_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(project_access.len());
        for grant in &project_access {
            if !seen.insert(&grant.project_id) {
                return Err(AuthzError::DuplicateProjectGrant(grant.project_id.clone()));
            }
        }

        let all_permission_names = derive_permission_names(&global_roles, &project_access);

        Ok(Self {
            global_roles,
            project_access,
            all_permission_names,
            fetched_at,
        })
    }

    /// The snapshot of a process that has never fetched permissions.
    pub fn empty() -> Self {
        Self {
            global_roles: Vec::new(),
            project_access: Vec::new(),
            all_permission_names: BTreeSet::new(),
            fetched_at: None,
        }
    }

    /// Returns a copy stamped with a new fetch time.
    pub fn with_fetched_at(&self, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at: Some(fetched_at),
            ..self.clone()
        }
    }

    pub fn global_roles(&self) -> &[Role] {
        &self.global_roles
    }

    pub fn project_access(&self) -> &[ProjectGrant] {
        &self.project_access
    }

    pub fn all_permission_names(&self) -> &BTreeSet<String> {
        &self.all_permission_names
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Fetch time in milliseconds since the Unix epoch, `None` if never fetched.
    pub fn fetched_at_epoch_millis(&self) -> Option<i64> {
        self.fetched_at.map(|ts| ts.timestamp_millis())
    }

    pub fn is_empty(&self) -> bool {
        self.global_roles.is_empty() && self.project_access.is_empty()
    }

    /// Finds the grant for a project.
    pub fn grant_for(&self, project_id: &ProjectId) -> Option<&ProjectGrant> {
        self.project_access
            .iter()
            .find(|grant| &grant.project_id == project_id)
    }
}

impl Default for PermissionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

fn derive_permission_names(roles: &[Role], grants: &[ProjectGrant]) -> BTreeSet<String> {
    roles
        .iter()
        .flat_map(|role| role.permissions.iter().map(|p| p.name.clone()))
        .chain(
            grants
                .iter()
                .flat_map(|grant| grant.permission_names.iter().cloned()),
        )
        .collect()
}
