use permission_cache::PermissionCache;
use serde::{Deserialize, Serialize};
use session::AuthSessionStore;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, RouteError};
use crate::loading::LoadingIndicator;
use crate::routes::{RequiredPermissions, RouteDef, RouteMatch, RouteTable};

/// Names of the routes the gate redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub login_route: String,
    pub home_route: String,
    pub unauthorized_route: String,
    pub not_found_route: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_route: "login".to_string(),
            home_route: "worklog-dashboard".to_string(),
            unauthorized_route: "unauthorized".to_string(),
            not_found_route: "not-found".to_string(),
        }
    }
}

/// Where an allowed or redirected navigation is applied.
pub trait Navigator: Send + Sync {
    fn commit(&self, target: &RouteMatch);
    fn redirect(&self, route: &RouteDef);
}

/// Stages of one navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    CheckingAuth,
    FetchingPermissions,
    EvaluatingPermissions,
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotFound,
    Unauthenticated,
    AlreadyAuthenticated,
    MissingPermissions,
    PermissionCheckFailed,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenialReason::NotFound => "no route matches",
            DenialReason::Unauthenticated => "authentication required",
            DenialReason::AlreadyAuthenticated => "already signed in",
            DenialReason::MissingPermissions => "missing required permissions",
            DenialReason::PermissionCheckFailed => "permission check failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Allowed {
        route: RouteMatch,
    },
    Redirected {
        to: Arc<RouteDef>,
        reason: DenialReason,
    },
    /// A newer navigation started before this one resolved; nothing was applied.
    Superseded,
}

impl NavigationOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, NavigationOutcome::Allowed { .. })
    }
}

enum Check {
    Granted,
    Denied(DenialReason),
    Superseded,
}

struct Targets {
    login: Arc<RouteDef>,
    home: Arc<RouteDef>,
    unauthorized: Arc<RouteDef>,
    not_found: Arc<RouteDef>,
}

impl Targets {
    fn resolve(routes: &RouteTable, config: &GateConfig) -> Result<Self> {
        let lookup = |name: &str| {
            routes
                .get(name)
                .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))
        };
        Ok(Self {
            login: lookup(&config.login_route)?,
            home: lookup(&config.home_route)?,
            unauthorized: lookup(&config.unauthorized_route)?,
            not_found: lookup(&config.not_found_route)?,
        })
    }
}

struct Attempt<'a> {
    token: u64,
    location: &'a str,
    state: GateState,
}

impl Attempt<'_> {
    fn enter(&mut self, next: GateState) {
        debug!(
            token = self.token,
            location = self.location,
            from = ?self.state,
            to = ?next,
            "Navigation state change"
        );
        self.state = next;
    }
}

/// Decides, for every navigation, whether the target may be shown.
///
/// Nothing is applied to the [`Navigator`] until the check has resolved, and
/// a check overtaken by a newer navigation applies nothing at all.
pub struct RouteAuthorizationGate {
    session: Arc<AuthSessionStore>,
    cache: Arc<PermissionCache>,
    routes: Arc<RouteTable>,
    navigator: Arc<dyn Navigator>,
    targets: Targets,
    loading: LoadingIndicator,
    latest: AtomicU64,
}

impl RouteAuthorizationGate {
    /// Fails if a route named in `config` is missing from `routes`.
    pub fn new(
        session: Arc<AuthSessionStore>,
        cache: Arc<PermissionCache>,
        routes: Arc<RouteTable>,
        navigator: Arc<dyn Navigator>,
        config: GateConfig,
    ) -> Result<Self> {
        let targets = Targets::resolve(&routes, &config)?;
        Ok(Self {
            session,
            cache,
            routes,
            navigator,
            targets,
            loading: LoadingIndicator::new(),
            latest: AtomicU64::new(0),
        })
    }

    pub fn with_loading_indicator(mut self, loading: LoadingIndicator) -> Self {
        self.loading = loading;
        self
    }

    pub fn loading(&self) -> &LoadingIndicator {
        &self.loading
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub async fn navigate(&self, location: &str) -> NavigationOutcome {
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let mut attempt = Attempt {
            token,
            location,
            state: GateState::Idle,
        };
        attempt.enter(GateState::CheckingAuth);

        let Some(target) = self.routes.resolve(location) else {
            return self.redirect(&mut attempt, self.targets.not_found.clone(), DenialReason::NotFound);
        };

        let authenticated = self.session.is_authenticated();

        if target.route.name == self.targets.login.name {
            return if authenticated {
                self.redirect(&mut attempt, self.targets.home.clone(), DenialReason::AlreadyAuthenticated)
            } else {
                self.allow(&mut attempt, target)
            };
        }

        let required = target.route.meta.required_permissions.clone();

        // Permissions can only be fetched for a signed-in user
        if (target.route.meta.requires_auth || required.is_some()) && !authenticated {
            return self.redirect(&mut attempt, self.targets.login.clone(), DenialReason::Unauthenticated);
        }

        let Some(required) = required else {
            return self.allow(&mut attempt, target);
        };

        let check = {
            let _loading = self.loading.begin();
            self.check_permissions(&mut attempt, &target, &required).await
        };

        match check {
            Check::Granted => self.allow(&mut attempt, target),
            Check::Denied(reason) => {
                self.redirect(&mut attempt, self.targets.unauthorized.clone(), reason)
            }
            Check::Superseded => self.superseded(&attempt),
        }
    }

    /// Fetch-then-evaluate, retrying once with a forced refresh on denial.
    async fn check_permissions(
        &self,
        attempt: &mut Attempt<'_>,
        target: &RouteMatch,
        required: &RequiredPermissions,
    ) -> Check {
        for force_refresh in [false, true] {
            attempt.enter(GateState::FetchingPermissions);
            let fetched = self.cache.fetch(force_refresh).await;

            if !self.is_current(attempt) {
                return Check::Superseded;
            }

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(
                        location = attempt.location,
                        error = %err,
                        "Permission check failed, denying navigation"
                    );
                    return Check::Denied(DenialReason::PermissionCheckFailed);
                }
            };

            attempt.enter(GateState::EvaluatingPermissions);
            if required.is_satisfied_by(&snapshot, &target.params) {
                return Check::Granted;
            }
            if !force_refresh {
                debug!(
                    location = attempt.location,
                    "Required permissions missing, retrying with fresh permissions"
                );
            }
        }

        Check::Denied(DenialReason::MissingPermissions)
    }

    fn is_current(&self, attempt: &Attempt<'_>) -> bool {
        self.latest.load(Ordering::SeqCst) == attempt.token
    }

    fn superseded(&self, attempt: &Attempt<'_>) -> NavigationOutcome {
        debug!(
            token = attempt.token,
            location = attempt.location,
            "Navigation superseded, discarding result"
        );
        NavigationOutcome::Superseded
    }

    fn allow(&self, attempt: &mut Attempt<'_>, target: RouteMatch) -> NavigationOutcome {
        if !self.is_current(attempt) {
            return self.superseded(attempt);
        }
        attempt.enter(GateState::Allowed);
        info!(location = attempt.location, route = %target.route.name, "Navigation allowed");
        self.navigator.commit(&target);
        NavigationOutcome::Allowed { route: target }
    }

    fn redirect(
        &self,
        attempt: &mut Attempt<'_>,
        to: Arc<RouteDef>,
        reason: DenialReason,
    ) -> NavigationOutcome {
        if !self.is_current(attempt) {
            return self.superseded(attempt);
        }
        attempt.enter(GateState::Denied);
        match reason {
            DenialReason::MissingPermissions | DenialReason::PermissionCheckFailed => warn!(
                location = attempt.location,
                to = %to.name,
                %reason,
                "Navigation denied"
            ),
            _ => debug!(location = attempt.location, to = %to.name, %reason, "Navigation redirected"),
        }
        self.navigator.redirect(&to);
        NavigationOutcome::Redirected { to, reason }
    }
}
