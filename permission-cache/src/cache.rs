use std::sync::{Arc, Mutex, MutexGuard};

use api_client::HttpClient;
use authz::{PermissionSnapshot, ProjectId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use session::{SessionEndReason, SessionObserver};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, Clock, SystemClock};
use crate::error::{PermissionError, Result};

const EVENT_CAPACITY: usize = 32;

/// Notifications published by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Refreshed { permission_count: usize },
    RefreshFailed { message: String },
    Cleared,
}

struct InFlight {
    id: u64,
    done: watch::Receiver<bool>,
}

struct CacheState {
    snapshot: Arc<PermissionSnapshot>,
    in_flight: Option<InFlight>,
    /// Bumped by `clear()`; a fetch started under an older epoch is discarded.
    epoch: u64,
    next_fetch_id: u64,
    /// Id of the fetch whose result is currently installed.
    installed_id: u64,
}

enum Step<'a> {
    Hit(Arc<PermissionSnapshot>),
    Wait { id: u64, done: watch::Receiver<bool> },
    Lead { guard: InFlightGuard<'a>, epoch: u64 },
}

/// Releases the in-flight marker when the leading fetch ends, however it ends.
///
/// Waiters are told the fetch completed only when `completed` is set; a
/// cancelled leader drops the sender instead, which waiters observe as an
/// abandoned fetch.
struct InFlightGuard<'a> {
    state: &'a Mutex<CacheState>,
    id: u64,
    done: Option<watch::Sender<bool>>,
    completed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if state.in_flight.as_ref().map(|f| f.id) == Some(self.id) {
                state.in_flight = None;
            }
        }
        if let Some(done) = self.done.take() {
            if self.completed {
                done.send_replace(true);
            }
        }
    }
}

/// Process-wide holder of the current user's permissions.
///
/// Readers always get an immutable [`PermissionSnapshot`] behind an `Arc`;
/// a refresh swaps the whole `Arc`, so nobody observes a half-updated set.
/// Concurrent callers of [`fetch`](Self::fetch) share one network request.
pub struct PermissionCache {
    client: Arc<dyn HttpClient>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl PermissionCache {
    pub fn new(client: Arc<dyn HttpClient>, config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            config,
            clock: Arc::new(SystemClock),
            state: Mutex::new(CacheState {
                snapshot: Arc::new(PermissionSnapshot::empty()),
                in_flight: None,
                epoch: 0,
                next_fetch_id: 1,
                installed_id: 0,
            }),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current snapshot. Never blocks on a fetch.
    pub fn snapshot(&self) -> Arc<PermissionSnapshot> {
        self.lock().snapshot.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.lock().snapshot.fetched_at()
    }

    pub fn fetched_at_epoch_millis(&self) -> Option<i64> {
        self.lock().snapshot.fetched_at_epoch_millis()
    }

    /// True when nothing has been fetched yet or the snapshot has aged out.
    pub fn is_stale(&self) -> bool {
        let fetched_at = self.fetched_at();
        self.is_stale_at(fetched_at)
    }

    fn is_stale_at(&self, fetched_at: Option<DateTime<Utc>>) -> bool {
        match fetched_at {
            None => true,
            Some(at) => match (self.clock.now() - at).to_std() {
                Ok(age) => age >= self.config.stale_after,
                // fetched_at in the future: clock went backwards, treat as fresh
                Err(_) => false,
            },
        }
    }

    /// Returns permissions, asking the backend only when needed.
    ///
    /// A fresh snapshot is returned as-is unless `force_refresh` is set. If a
    /// fetch is already running the caller waits for it (up to the configured
    /// wait timeout) instead of issuing a second request.
    pub async fn fetch(&self, force_refresh: bool) -> Result<Arc<PermissionSnapshot>> {
        // Fetch this caller saw end without a result; never wait on it again
        let mut abandoned = None;
        loop {
            match self.next_step(force_refresh, abandoned) {
                Step::Hit(snapshot) => {
                    debug!("Permission cache hit");
                    return Ok(snapshot);
                }
                Step::Wait { id, done } => {
                    if self.wait_for(id, done).await {
                        return Ok(self.snapshot());
                    }
                    abandoned = Some(id);
                }
                Step::Lead { guard, epoch } => return self.lead(guard, epoch).await,
            }
        }
    }

    /// Decides what this caller does, claiming leadership in the same lock
    /// that saw no fetch running. A newer fetch started by another caller is
    /// joined even after `abandoned` was given up on.
    fn next_step(&self, force_refresh: bool, abandoned: Option<u64>) -> Step<'_> {
        let mut state = self.lock();

        if !force_refresh && !self.is_stale_at(state.snapshot.fetched_at()) {
            return Step::Hit(state.snapshot.clone());
        }

        if let Some(in_flight) = &state.in_flight {
            if abandoned != Some(in_flight.id) {
                return Step::Wait {
                    id: in_flight.id,
                    done: in_flight.done.clone(),
                };
            }
        }

        let id = state.next_fetch_id;
        state.next_fetch_id += 1;
        let (tx, rx) = watch::channel(false);
        state.in_flight = Some(InFlight { id, done: rx });

        Step::Lead {
            guard: InFlightGuard {
                state: &self.state,
                id,
                done: Some(tx),
                completed: false,
            },
            epoch: state.epoch,
        }
    }

    /// Waits for fetch `id`. Returns false when the caller should fetch itself.
    async fn wait_for(&self, id: u64, mut done: watch::Receiver<bool>) -> bool {
        debug!(fetch_id = id, "Waiting for in-flight permission fetch");
        match tokio::time::timeout(self.config.wait_timeout, done.wait_for(|finished| *finished)).await
        {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => {
                debug!(fetch_id = id, "In-flight permission fetch was abandoned");
                false
            }
            Err(_) => {
                warn!(
                    fetch_id = id,
                    timeout_ms = self.config.wait_timeout.as_millis() as u64,
                    "Timed out waiting for in-flight permission fetch"
                );
                let mut state = self.lock();
                if state.in_flight.as_ref().map(|f| f.id) == Some(id) {
                    state.in_flight = None;
                }
                false
            }
        }
    }

    async fn lead(
        &self,
        mut guard: InFlightGuard<'_>,
        epoch: u64,
    ) -> Result<Arc<PermissionSnapshot>> {
        let id = guard.id;
        info!(fetch_id = id, endpoint = %self.config.endpoint, "Fetching permissions");

        let outcome = match self.client.get_json(&self.config.endpoint).await {
            Ok(raw) => authz::normalize(&raw, self.clock.now()).map_err(PermissionError::from),
            Err(err) => Err(PermissionError::from(err)),
        };

        let result = match outcome {
            Ok(snapshot) => Ok(self.install(id, epoch, snapshot)),
            Err(err) => {
                warn!(
                    fetch_id = id,
                    transient = err.is_transient(),
                    error = %err,
                    "Permission fetch failed, keeping previous snapshot"
                );
                Err(err)
            }
        };

        guard.completed = true;
        drop(guard);
        result
    }

    fn install(&self, id: u64, epoch: u64, snapshot: PermissionSnapshot) -> Arc<PermissionSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut state = self.lock();

        if state.epoch != epoch {
            debug!(fetch_id = id, "Cache cleared during fetch, discarding result");
            return state.snapshot.clone();
        }
        if state.installed_id > id {
            debug!(fetch_id = id, "A newer fetch already installed, discarding result");
            return state.snapshot.clone();
        }

        state.snapshot = snapshot.clone();
        state.installed_id = id;
        drop(state);

        let permission_count = snapshot.all_permission_names().len();
        info!(fetch_id = id, permission_count, "Permissions refreshed");
        let _ = self.events.send(CacheEvent::Refreshed { permission_count });
        snapshot
    }

    /// Drops all cached permissions. A fetch still in flight will not install
    /// its result.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.snapshot = Arc::new(PermissionSnapshot::empty());
            state.epoch += 1;
            state.installed_id = 0;
        }
        info!("Permission cache cleared");
        let _ = self.events.send(CacheEvent::Cleared);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Refreshes without making the caller wait. Failures are logged and
    /// published as [`CacheEvent::RefreshFailed`].
    pub fn refresh_in_background(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = cache.fetch(false).await {
                warn!(transient = err.is_transient(), error = %err, "Background permission refresh failed");
                let _ = cache.events.send(CacheEvent::RefreshFailed {
                    message: err.to_string(),
                });
            }
        })
    }

    pub fn has_permission(&self, name: &str, project: Option<&ProjectId>) -> bool {
        self.snapshot().has_permission(name, project)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, names: &[S], project: Option<&ProjectId>) -> bool {
        self.snapshot().has_any_permission(names, project)
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, names: &[S], project: Option<&ProjectId>) -> bool {
        self.snapshot().has_all_permissions(names, project)
    }

    pub fn has_project_permission(&self, project: &ProjectId, name: &str) -> bool {
        self.snapshot().has_project_permission(project, name)
    }
}

impl SessionObserver for PermissionCache {
    fn on_session_ended(&self, reason: SessionEndReason) {
        debug!(%reason, "Session ended, clearing permissions");
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{permission_payload, ManualClock, Reply, ScriptedClient};
    use session::{AuthSessionStore, AuthenticatedUser, SessionGrant};
    use std::time::Duration;

    fn admin_payload() -> serde_json::Value {
        permission_payload(
            &[("Admin", &["system_config_company.view", "project.view"])],
            &[(42, &["worklog.create"])],
        )
    }

    fn cache_with(client: Arc<ScriptedClient>) -> PermissionCache {
        PermissionCache::new(client, CacheConfig::default())
    }

    async fn until_fetching(cache: &PermissionCache) {
        while !cache.is_fetching() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fetch_populates_snapshot() {
        let client = Arc::new(ScriptedClient::new(admin_payload()));
        let cache = cache_with(client.clone());

        assert!(cache.is_stale());
        let snapshot = cache.fetch(false).await.unwrap();

        assert!(snapshot.has_global_permission("project.view"));
        assert!(cache.has_permission("worklog.create", Some(&ProjectId::from(42))));
        assert!(cache.fetched_at_epoch_millis().is_some());
        assert!(!cache.is_stale());
        assert_eq!(client.paths(), vec!["/users/me/permissions".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_hit_is_idempotent() {
        let client = Arc::new(ScriptedClient::new(admin_payload()));
        let cache = cache_with(client.clone());

        let first = cache.fetch(false).await.unwrap();
        let second = cache.fetch(false).await.unwrap();

        assert_eq!(client.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let client = Arc::new(ScriptedClient::new(admin_payload()));
        let cache = cache_with(client.clone());

        cache.fetch(false).await.unwrap();
        cache.fetch(true).await.unwrap();

        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_refetched() {
        let client = Arc::new(ScriptedClient::new(admin_payload()));
        let clock = Arc::new(ManualClock::default());
        let cache = cache_with(client.clone()).with_clock(clock.clone());

        cache.fetch(false).await.unwrap();
        clock.advance(Duration::from_secs(119));
        cache.fetch(false).await.unwrap();
        assert_eq!(client.calls(), 1);

        clock.advance(Duration::from_secs(1));
        assert!(cache.is_stale());
        cache.fetch(false).await.unwrap();
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let (client, gate) = ScriptedClient::new(admin_payload()).gated();
        let client = Arc::new(client);
        let cache = cache_with(client.clone());

        let release = async {
            until_fetching(&cache).await;
            // let the other callers reach the wait
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            gate.release(1);
        };

        let (a, b, c, ()) = tokio::join!(cache.fetch(false), cache.fetch(false), cache.fetch(true), release);
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(client.calls(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert!(!cache.is_fetching());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let client = Arc::new(
            ScriptedClient::new(admin_payload())
                .then(Reply::Json(admin_payload()))
                .then(Reply::Status(503)),
        );
        let cache = cache_with(client.clone());

        let before = cache.fetch(false).await.unwrap();
        let err = cache.fetch(true).await.unwrap_err();

        assert!(matches!(err, PermissionError::Network(_)));
        assert!(Arc::ptr_eq(&before, &cache.snapshot()));
        assert!(!cache.is_fetching());
    }

    #[tokio::test]
    async fn test_waiter_gets_last_known_good_when_leader_fails() {
        let (client, gate) = ScriptedClient::with_default(Reply::Status(500)).gated();
        let client = Arc::new(client);
        let cache = cache_with(client.clone());

        let release = async {
            until_fetching(&cache).await;
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            gate.release(1);
        };

        let (leader, waiter, ()) = tokio::join!(cache.fetch(false), cache.fetch(false), release);

        assert!(leader.is_err());
        let waiter = waiter.unwrap();
        assert!(waiter.is_empty());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_is_reported() {
        let client = Arc::new(ScriptedClient::with_default(Reply::Unauthorized));
        let cache = cache_with(client);

        let err = cache.fetch(false).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_schema_error() {
        let client = Arc::new(ScriptedClient::new(serde_json::json!({ "roles": [] })));
        let cache = cache_with(client);

        let err = cache.fetch(false).await.unwrap_err();
        assert!(matches!(err, PermissionError::Schema(_)));
        assert!(cache.snapshot().fetched_at().is_none());
    }

    #[tokio::test]
    async fn test_waiter_times_out_and_fetches_itself() {
        let client = Arc::new(ScriptedClient::new(admin_payload()).then(Reply::Hang));
        let cache = Arc::new(PermissionCache::new(
            client.clone(),
            CacheConfig::default().with_wait_timeout(Duration::from_millis(50)),
        ));

        let stuck = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch(false).await })
        };
        until_fetching(&cache).await;

        let snapshot = cache.fetch(false).await.unwrap();
        assert!(snapshot.has_global_permission("project.view"));
        assert_eq!(client.calls(), 2);

        stuck.abort();
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_marker() {
        let client = Arc::new(ScriptedClient::new(admin_payload()).then(Reply::Hang));
        let cache = cache_with(client.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(20), cache.fetch(false)).await;
        assert!(cancelled.is_err());
        assert!(!cache.is_fetching());

        cache.fetch(false).await.unwrap();
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_waiters_of_cancelled_leader_share_one_retry() {
        let (client, gate) = ScriptedClient::new(admin_payload()).then(Reply::Hang).gated();
        let client = Arc::new(client);
        let cache = Arc::new(cache_with(client.clone()));

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch(false).await })
        };
        until_fetching(&cache).await;

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.fetch(false).await })
            })
            .collect();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.release(3);

        let mut snapshots = Vec::new();
        for waiter in waiters {
            snapshots.push(waiter.await.unwrap().unwrap());
        }

        assert_eq!(client.calls(), 2);
        assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
        assert!(snapshots[0].has_global_permission("project.view"));
        assert!(!cache.is_fetching());
    }

    #[tokio::test]
    async fn test_timed_out_waiters_share_one_retry() {
        let (client, gate) = ScriptedClient::new(admin_payload()).then(Reply::Hang).gated();
        let client = Arc::new(client);
        let cache = Arc::new(PermissionCache::new(
            client.clone(),
            CacheConfig::default().with_wait_timeout(Duration::from_millis(50)),
        ));
        gate.release(1);

        let stuck = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch(false).await })
        };
        until_fetching(&cache).await;

        let release_retry = async {
            while client.calls() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            gate.release(3);
        };
        let (a, b, c, ()) = tokio::join!(cache.fetch(false), cache.fetch(false), cache.fetch(false), release_retry);
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(client.calls(), 2);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));

        stuck.abort();
    }

    #[tokio::test]
    async fn test_clear_during_fetch_discards_result() {
        let (client, gate) = ScriptedClient::new(admin_payload()).gated();
        let cache = cache_with(Arc::new(client));

        let clear_midway = async {
            until_fetching(&cache).await;
            cache.clear();
            gate.release(1);
        };

        let (result, ()) = tokio::join!(cache.fetch(false), clear_midway);

        assert!(result.unwrap().is_empty());
        assert!(cache.fetched_at().is_none());
        assert!(!cache.has_permission("project.view", None));
    }

    #[tokio::test]
    async fn test_logout_clears_cache() {
        let client = Arc::new(ScriptedClient::new(admin_payload()));
        let cache = Arc::new(cache_with(client));
        let session = AuthSessionStore::new();
        session.subscribe(cache.clone());
        session
            .login(SessionGrant::new(
                "token",
                AuthenticatedUser::new("7", "dana", "dana@example.com"),
            ))
            .unwrap();

        cache.fetch(false).await.unwrap();
        assert!(cache.has_permission("project.view", None));

        let mut events = cache.subscribe();
        session.logout();

        assert!(cache.fetched_at_epoch_millis().is_none());
        assert!(!cache.has_permission("project.view", None));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Cleared);
    }

    #[tokio::test]
    async fn test_background_refresh_publishes_events() {
        let client = Arc::new(ScriptedClient::new(admin_payload()).then(Reply::Status(502)));
        let cache = Arc::new(cache_with(client));
        let mut events = cache.subscribe();

        cache.refresh_in_background().await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), CacheEvent::RefreshFailed { .. }));

        cache.refresh_in_background().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Refreshed { permission_count: 3 }
        );
    }
}
