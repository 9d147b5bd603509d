//! Test doubles for code that depends on the permission cache.
//!
//! - [`ScriptedClient`]: an [`HttpClient`] that replays scripted replies,
//!   counts calls and can hold requests until released
//! - [`ManualClock`]: a [`Clock`] that only moves when told to
//! - [`permission_payload`]: builds backend responses in the canonical shape

use api_client::{ClientError, HttpClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::Clock;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    Unauthorized,
    /// Never completes.
    Hang,
}

/// An [`HttpClient`] with scripted replies.
///
/// Replies queued with [`then`](Self::then) are served first, after which
/// every call gets the default reply.
pub struct ScriptedClient {
    default: Reply,
    queue: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    paths: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub fn new(default: Value) -> Self {
        Self::with_default(Reply::Json(default))
    }

    pub fn with_default(default: Reply) -> Self {
        Self {
            default,
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            paths: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Queues a reply for the next unscripted call.
    pub fn then(self, reply: Reply) -> Self {
        self.lock_queue().push_back(reply);
        self
    }

    /// Holds every request until [`Gate::release`] is called.
    pub fn gated(mut self) -> (Self, Gate) {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gate = Some(semaphore.clone());
        (self, Gate { semaphore })
    }

    /// Number of requests issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths requested so far, in order.
    pub fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn get_json(&self, path: &str) -> api_client::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path.to_string());

        let reply = self
            .lock_queue()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match reply {
            Reply::Json(value) => Ok(value),
            Reply::Status(status) => Err(ClientError::Status {
                status,
                message: "scripted failure".to_string(),
            }),
            Reply::Unauthorized => Err(ClientError::Unauthorized),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Releases requests held by a gated [`ScriptedClient`].
#[derive(Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
}

impl Gate {
    /// Lets `n` held (or future) requests through.
    pub fn release(&self, n: usize) {
        self.semaphore.add_permits(n);
    }
}

/// A clock that only moves when advanced.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01 09:00 UTC
        Self::new(DateTime::from_timestamp(1_704_099_600, 0).unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds a canonical permission response.
///
/// `global` is a list of `(role name, permission names)`, `projects` a list
/// of `(project id, permission names)`.
pub fn permission_payload(global: &[(&str, &[&str])], projects: &[(i64, &[&str])]) -> Value {
    let mut next_permission_id = 0;
    let global_roles: Vec<Value> = global
        .iter()
        .enumerate()
        .map(|(role_id, (name, permissions))| {
            let permissions: Vec<Value> = permissions
                .iter()
                .map(|permission| {
                    next_permission_id += 1;
                    json!({ "id": next_permission_id, "name": permission })
                })
                .collect();
            json!({ "id": role_id + 1, "name": name, "permissions": permissions })
        })
        .collect();

    let project_access: Vec<Value> = projects
        .iter()
        .map(|(project_id, names)| {
            json!({ "project_id": project_id, "permission_names": names, "roles": ["Member"] })
        })
        .collect();

    json!({ "data": { "global_roles": global_roles, "project_access": project_access } })
}
