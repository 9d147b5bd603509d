//! Shared, deduplicated cache of the signed-in user's permissions.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use permission_cache::{CacheConfig, PermissionCache};
//! # async fn demo(client: Arc<dyn api_client::HttpClient>) -> permission_cache::Result<()> {
//! let cache = PermissionCache::new(client, CacheConfig::default());
//! let snapshot = cache.fetch(false).await?;
//! if snapshot.has_permission("project.view", None) {
//!     // ...
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod testing;

pub use cache::{CacheEvent, PermissionCache};
pub use config::{CacheConfig, Clock, SystemClock, DEFAULT_ENDPOINT, DEFAULT_STALE_AFTER, DEFAULT_WAIT_TIMEOUT};
pub use error::{PermissionError, Result};
