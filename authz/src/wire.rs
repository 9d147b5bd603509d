//! Decoding of the backend permission payload.
//!
//! Exactly one shape is accepted:
//!
//! ```json
//! { "data": {
//!     "global_roles":   [{ "id": 1, "name": "Admin", "permissions": [{ "id": 1, "name": "project.create" }] }],
//!     "project_access": [{ "project_id": 5, "permission_names": ["worklog.view_own"], "roles": ["Member"] }]
//! } }
//! ```
//!
//! Anything else is a [`AuthzError::Schema`]. Unknown extra fields are ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::types::{PermissionSnapshot, ProjectGrant, Role};

#[derive(Debug, Deserialize)]
struct PermissionEnvelope {
    data: PermissionPayload,
}

#[derive(Debug, Deserialize)]
struct PermissionPayload {
    global_roles: Vec<Role>,
    project_access: Vec<ProjectGrant>,
}

/// Normalizes a raw backend response into a snapshot stamped with `fetched_at`.
pub fn normalize(value: &Value, fetched_at: DateTime<Utc>) -> Result<PermissionSnapshot> {
    if !value.is_object() {
        return Err(AuthzError::Schema(format!(
            "expected a JSON object, got {}",
            json_kind(value)
        )));
    }

    let envelope = PermissionEnvelope::deserialize(value)?;
    let payload = envelope.data;

    debug!(
        global_roles = payload.global_roles.len(),
        project_access = payload.project_access.len(),
        "Decoded permission payload"
    );

    PermissionSnapshot::new(payload.global_roles, payload.project_access, Some(fetched_at))
        .map_err(|e| AuthzError::Schema(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
