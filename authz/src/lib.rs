//! Client-side permission model for Tally.
//!
//! This crate holds the user's permission graph as fetched from the backend
//! and answers questions about it. It performs no I/O: fetching, caching and
//! invalidation live in `permission-cache`, route gating in `route-gate`.
//!
//! # Model
//!
//! - **Global roles** bundle permissions that apply across the application
//! - **Project grants** list the permissions a user holds inside one project
//! - The **flattened name set** is the union of both, derived on construction
//!
//! # Resolution
//!
//! A global grant always wins. A project-scoped check falls back to that
//! project's grant only. An unscoped check accepts the permission if any
//! project grants it.
//!
//! # Example
//!
//! ```rust
//! use authz::{Permission, PermissionSnapshot, ProjectGrant, ProjectId, Role};
//!
//! let snapshot = PermissionSnapshot::new(
//!     vec![Role::new(1, "Admin", vec![Permission::new(1, "project.create")])],
//!     vec![ProjectGrant::new(5, ["worklog.view_own"], vec!["Member".into()])],
//!     None,
//! )
//! .unwrap();
//!
//! assert!(snapshot.has_permission("project.create", None));
//! assert!(snapshot.has_permission("worklog.view_own", Some(&ProjectId::from(5))));
//! assert!(!snapshot.has_permission("worklog.view_own", Some(&ProjectId::from(7))));
//! ```

pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod types;
pub mod wire;

pub use catalog::RoleTier;
pub use error::{AuthzError, Result};
pub use types::{Permission, PermissionSnapshot, ProjectGrant, ProjectId, Role};
pub use wire::normalize;
