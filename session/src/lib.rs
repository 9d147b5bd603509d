//! Authentication session state for Tally.
//!
//! This crate provides:
//! - The signed-in identity and its tokens ([`AuthSessionStore`])
//! - Session-end notifications for caches that must not outlive a user
//!   ([`SessionObserver`])
//! - File persistence so a session survives restarts ([`SessionFile`])

pub mod error;
pub mod persist;
pub mod store;
pub mod types;

pub use error::{Result, SessionError};
pub use persist::SessionFile;
pub use store::{AuthSessionStore, SessionObserver};
pub use types::{ActiveSession, AuthState, AuthenticatedUser, SessionEndReason, SessionGrant};
