//! Composition root of the Tally access layer.
//!
//! [`AccessContext`] owns the single instance of each piece (session store,
//! HTTP client, permission cache, route table) and wires the session-end
//! notifications between them.

pub mod config;
pub mod error;
pub mod logging;

use std::sync::Arc;

use api_client::{ApiClient, HttpClient};
use permission_cache::PermissionCache;
use route_gate::{Navigator, RouteAuthorizationGate, RouteTable};
use session::{AuthSessionStore, SessionFile, SessionGrant};
use tracing::info;

pub use config::AccessConfig;
pub use error::{AccessError, Result};

pub struct AccessContext {
    config: AccessConfig,
    session: Arc<AuthSessionStore>,
    session_file: Arc<SessionFile>,
    client: Arc<ApiClient>,
    cache: Arc<PermissionCache>,
    routes: Arc<RouteTable>,
}

impl AccessContext {
    /// Builds every component and restores a saved session, if any.
    pub fn new(config: AccessConfig) -> Result<Self> {
        config.validate()?;

        let session = Arc::new(AuthSessionStore::new());
        let session_file = Arc::new(SessionFile::new(config.session_file()));
        if session.restore_from(&session_file) {
            info!("Restored saved session");
        }

        let client = Arc::new(ApiClient::new(
            &config.api_base_url,
            config.request_timeout(),
            session.clone(),
        )?);
        let http: Arc<dyn HttpClient> = client.clone();
        let cache = Arc::new(PermissionCache::new(http, config.cache_config()));
        let routes = Arc::new(config.load_routes()?);

        // Whatever ends the session also drops cached permissions and the saved token
        session.subscribe(cache.clone());
        session.subscribe(session_file.clone());

        Ok(Self {
            config,
            session,
            session_file,
            client,
            cache,
            routes,
        })
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<AuthSessionStore> {
        &self.session
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Builds a gate over this context's components that applies outcomes to `navigator`.
    pub fn gate(&self, navigator: Arc<dyn Navigator>) -> Result<RouteAuthorizationGate> {
        Ok(RouteAuthorizationGate::new(
            self.session.clone(),
            self.cache.clone(),
            self.routes.clone(),
            navigator,
            self.config.gate.clone(),
        )?)
    }

    /// Signs in and saves the session.
    pub fn login(&self, grant: SessionGrant) -> Result<()> {
        self.session.login(grant)?;
        self.session.persist_to(&self.session_file)?;
        Ok(())
    }

    /// Signs out. The saved session and cached permissions are dropped by
    /// the session-end observers.
    pub fn logout(&self) {
        self.session.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_gate::{NavigationOutcome, RouteDef, RouteMatch};
    use session::AuthenticatedUser;
    use tempfile::TempDir;

    struct Discard;

    impl Navigator for Discard {
        fn commit(&self, _target: &RouteMatch) {}
        fn redirect(&self, _route: &RouteDef) {}
    }

    fn config(base_url: &str, data: &TempDir) -> AccessConfig {
        AccessConfig {
            api_base_url: base_url.to_string(),
            data_path: data.path().to_path_buf(),
            ..AccessConfig::default()
        }
    }

    fn grant() -> SessionGrant {
        SessionGrant::new("token-abc", AuthenticatedUser::new("7", "dana", "dana@example.com"))
    }

    const ADMIN_BODY: &str = r#"{"data":{"global_roles":[{"id":1,"name":"Admin","permissions":[{"id":9,"name":"system_config_company.view"}]}],"project_access":[]}}"#;

    #[test]
    fn test_login_persists_and_restores() {
        let data = TempDir::new().unwrap();
        let ctx = AccessContext::new(config("http://localhost:1", &data)).unwrap();
        ctx.login(grant()).unwrap();
        assert!(ctx.config().session_file().exists());

        let restored = AccessContext::new(config("http://localhost:1", &data)).unwrap();
        assert_eq!(restored.session().user_id().as_deref(), Some("7"));

        restored.logout();
        assert!(!restored.config().session_file().exists());
    }

    #[tokio::test]
    async fn test_gate_over_live_client() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/me/permissions")
            .match_header("authorization", "Bearer token-abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ADMIN_BODY)
            .expect(1)
            .create_async()
            .await;

        let data = TempDir::new().unwrap();
        let ctx = AccessContext::new(config(&server.url(), &data)).unwrap();
        ctx.login(grant()).unwrap();
        let gate = ctx.gate(Arc::new(Discard)).unwrap();

        assert!(gate.navigate("/system-config").await.is_allowed());
        assert!(gate.navigate("/system-config").await.is_allowed());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_signs_out_everywhere() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/me/permissions")
            .with_status(401)
            .create_async()
            .await;

        let data = TempDir::new().unwrap();
        let ctx = AccessContext::new(config(&server.url(), &data)).unwrap();
        ctx.login(grant()).unwrap();
        let gate = ctx.gate(Arc::new(Discard)).unwrap();

        let outcome = gate.navigate("/system-config").await;

        assert!(matches!(outcome, NavigationOutcome::Redirected { ref to, .. } if to.name == "unauthorized"));
        assert!(!ctx.session().is_authenticated());
        assert!(!ctx.config().session_file().exists());
        assert!(ctx.cache().fetched_at().is_none());
    }
}
