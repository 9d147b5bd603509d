//! Read-only permission queries over a [`PermissionSnapshot`].
//!
//! Every query is synchronous and side-effect free. Resolution order for a
//! single name is: global roles, then the named project's grant (when a
//! project is given), then the flattened set of every name the user holds
//! anywhere.

use crate::types::{PermissionSnapshot, ProjectId};

impl PermissionSnapshot {
    /// True iff some global role carries `name`.
    pub fn has_global_permission(&self, name: &str) -> bool {
        self.global_roles().iter().any(|role| role.grants(name))
    }

    /// True iff the grant for `project_id` lists `name`. No grant means false.
    pub fn has_project_permission(&self, project_id: &ProjectId, name: &str) -> bool {
        self.grant_for(project_id)
            .map(|grant| grant.permission_names.contains(name))
            .unwrap_or(false)
    }

    /// Checks one permission.
    ///
    /// A global grant always wins. With a project, falls back to that
    /// project's grant only. Without one, any project granting `name` counts.
    pub fn has_permission(&self, name: &str, project_id: Option<&ProjectId>) -> bool {
        if self.has_global_permission(name) {
            return true;
        }

        match project_id {
            Some(project_id) => self.has_project_permission(project_id, name),
            None => self.all_permission_names().contains(name),
        }
    }

    /// True iff at least one of `names` is held. False for an empty list.
    pub fn has_any_permission<S: AsRef<str>>(
        &self,
        names: &[S],
        project_id: Option<&ProjectId>,
    ) -> bool {
        names
            .iter()
            .any(|name| self.has_permission(name.as_ref(), project_id))
    }

    /// True iff every one of `names` is held.
    ///
    /// An empty list is vacuously satisfied and returns true.
    pub fn has_all_permissions<S: AsRef<str>>(
        &self,
        names: &[S],
        project_id: Option<&ProjectId>,
    ) -> bool {
        names
            .iter()
            .all(|name| self.has_permission(name.as_ref(), project_id))
    }

    /// True iff the user holds any grant at all for `project_id`.
    pub fn has_project_access(&self, project_id: &ProjectId) -> bool {
        self.grant_for(project_id).is_some()
    }

    /// Projects the user has a grant for, in payload order.
    pub fn accessible_projects(&self) -> Vec<&ProjectId> {
        self.project_access()
            .iter()
            .map(|grant| &grant.project_id)
            .collect()
    }

    /// Role names held inside a project; empty when there is no grant.
    pub fn project_roles(&self, project_id: &ProjectId) -> &[String] {
        self.grant_for(project_id)
            .map(|grant| grant.roles.as_slice())
            .unwrap_or(&[])
    }
}
