//! Permission names used by the Tally application.
//!
//! These must match the backend permission enums.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PermissionSnapshot;

pub mod worklog {
    pub const CREATE: &str = "worklog.create";
    pub const VIEW_OWN: &str = "worklog.view_own";
    pub const VIEW_ANY: &str = "worklog.view_any";
    pub const UPDATE_OWN: &str = "worklog.update_own";
    pub const UPDATE_ANY: &str = "worklog.update_any";
    pub const DELETE_OWN: &str = "worklog.delete_own";
    pub const DELETE_ANY: &str = "worklog.delete_any";

    pub const ALL: &[&str] = &[
        CREATE, VIEW_OWN, VIEW_ANY, UPDATE_OWN, UPDATE_ANY, DELETE_OWN, DELETE_ANY,
    ];
}

pub mod role {
    pub const VIEW_OWN: &str = "role_permission.view_own";
    pub const VIEW_ANY: &str = "role_permission.view_any";
    pub const CREATE: &str = "role_permission.create";
    pub const ASSIGN_PERMISSION_TO_ROLE: &str = "role_permission.assign_permission_to_role";
    pub const REMOVE_PERMISSION_FROM_ROLE: &str = "role_permission.remove_permission_from_role";
    pub const ASSIGN_USER_TO_ROLE: &str = "role_permission.assign_user_to_role";
    pub const REMOVE_USER_FROM_ROLE: &str = "role_permission.remove_user_from_role";

    pub const ALL: &[&str] = &[
        VIEW_OWN,
        VIEW_ANY,
        CREATE,
        ASSIGN_PERMISSION_TO_ROLE,
        REMOVE_PERMISSION_FROM_ROLE,
        ASSIGN_USER_TO_ROLE,
        REMOVE_USER_FROM_ROLE,
    ];
}

pub mod project {
    pub const CREATE: &str = "project.create";
    pub const ADD_USER: &str = "project.add_user";
    pub const UPDATE_PROJECT: &str = "project.update_project";
    pub const DELETE_USER: &str = "project.delete_user";
    pub const ASSIGN_ROLE: &str = "project.assign_role";
    pub const CREATE_ROLE: &str = "project.create_role";
    pub const VIEW_MEMBER_OWN: &str = "project.view_member_own";
    pub const VIEW_MEMBER_ANY: &str = "project.view_member_any";

    pub const ALL: &[&str] = &[
        CREATE,
        ADD_USER,
        UPDATE_PROJECT,
        DELETE_USER,
        ASSIGN_ROLE,
        CREATE_ROLE,
        VIEW_MEMBER_OWN,
        VIEW_MEMBER_ANY,
    ];
}

pub mod system_config {
    pub const VIEW_COMPANY: &str = "system_config_company.view";
}

/// Permissions that mark a user as an administrator.
pub const ADMIN: &[&str] = &[
    role::CREATE,
    role::ASSIGN_PERMISSION_TO_ROLE,
    role::REMOVE_PERMISSION_FROM_ROLE,
    role::ASSIGN_USER_TO_ROLE,
    role::REMOVE_USER_FROM_ROLE,
    project::CREATE,
    project::CREATE_ROLE,
];

/// Permissions that mark a user as a project manager.
pub const PROJECT_MANAGER: &[&str] = &[
    project::ADD_USER,
    project::DELETE_USER,
    project::ASSIGN_ROLE,
    project::VIEW_MEMBER_ANY,
    worklog::VIEW_ANY,
    worklog::UPDATE_ANY,
    worklog::DELETE_ANY,
];

/// Permissions every regular user is expected to hold.
pub const USER: &[&str] = &[
    worklog::CREATE,
    worklog::VIEW_OWN,
    worklog::UPDATE_OWN,
    worklog::DELETE_OWN,
    project::VIEW_MEMBER_OWN,
    role::VIEW_OWN,
];

/// Every permission name the application knows about.
pub fn all_permissions() -> Vec<&'static str> {
    worklog::ALL
        .iter()
        .chain(role::ALL)
        .chain(project::ALL)
        .copied()
        .chain(std::iter::once(system_config::VIEW_COMPANY))
        .collect()
}

/// Permissions in one category (`worklog`, `role`, `project`), case-insensitive.
pub fn permissions_in_category(category: &str) -> &'static [&'static str] {
    match category.to_ascii_lowercase().as_str() {
        "worklog" => worklog::ALL,
        "role" => role::ALL,
        "project" => project::ALL,
        _ => &[],
    }
}

/// Coarse classification of a user by the permission groups they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTier {
    Admin,
    ProjectManager,
    BasicUser,
    NoAccess,
}

impl RoleTier {
    /// Highest tier whose group the user holds any permission of.
    pub fn classify(snapshot: &PermissionSnapshot) -> Self {
        if snapshot.has_any_permission(ADMIN, None) {
            RoleTier::Admin
        } else if snapshot.has_any_permission(PROJECT_MANAGER, None) {
            RoleTier::ProjectManager
        } else if snapshot.has_any_permission(USER, None) {
            RoleTier::BasicUser
        } else {
            RoleTier::NoAccess
        }
    }
}

impl fmt::Display for RoleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleTier::Admin => write!(f, "admin"),
            RoleTier::ProjectManager => write!(f, "project_manager"),
            RoleTier::BasicUser => write!(f, "user"),
            RoleTier::NoAccess => write!(f, "no_access"),
        }
    }
}
