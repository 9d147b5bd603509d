use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default permission endpoint, relative to the API base URL.
pub const DEFAULT_ENDPOINT: &str = "/users/me/permissions";

/// How long a fetched snapshot is served without asking the backend again.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60);

/// Ceiling on waiting for someone else's in-flight fetch.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for a [`PermissionCache`](crate::PermissionCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub endpoint: String,
    pub stale_after: Duration,
    pub wait_timeout: Duration,
}

impl CacheConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            stale_after: DEFAULT_STALE_AFTER,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Source of "now" for staleness checks and fetch timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.endpoint, "/users/me/permissions");
        assert_eq!(config.stale_after, Duration::from_secs(120));
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::default()
            .with_endpoint("/v2/permissions")
            .with_stale_after(Duration::from_secs(300))
            .with_wait_timeout(Duration::from_millis(500));
        assert_eq!(config.endpoint, "/v2/permissions");
        assert_eq!(config.stale_after, Duration::from_secs(300));
        assert_eq!(config.wait_timeout, Duration::from_millis(500));
    }
}
