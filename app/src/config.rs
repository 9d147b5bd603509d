use permission_cache::CacheConfig;
use route_gate::{GateConfig, RouteTable};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AccessError, Result};

/// Config file read from the working directory unless `TALLY_CONFIG_FILE` says otherwise.
pub const DEFAULT_CONFIG_FILE: &str = "config.access.yaml";

/// Route table compiled into the binary.
pub const DEFAULT_ROUTES: &str = include_str!("../config/routes.yaml");

/// Settings for the access layer.
///
/// Precedence, lowest first: built-in defaults, the YAML config file, then
/// `TALLY_*` environment variables (a `.env` file is loaded first if present).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub api_base_url: String,
    pub permission_endpoint: String,
    pub permission_stale_secs: u64,
    pub permission_wait_secs: u64,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes_file: Option<PathBuf>,
    pub data_path: PathBuf,
    pub gate: GateConfig,
}

impl Default for AccessConfig {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            permission_endpoint: cache.endpoint,
            permission_stale_secs: cache.stale_after.as_secs(),
            permission_wait_secs: cache.wait_timeout.as_secs(),
            request_timeout_secs: 30,
            routes_file: None,
            data_path: PathBuf::from("./data"),
            gate: GateConfig::default(),
        }
    }
}

impl AccessConfig {
    /// Loads configuration from the config file and the environment.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let file = env::var("TALLY_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if file.exists() {
            Self::from_file(&file)?
        } else {
            debug!("No config file at {:?}, using defaults", file);
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading access configuration from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Overrides fields from `TALLY_*` variables found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TALLY_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(endpoint) = lookup("TALLY_PERMISSION_ENDPOINT") {
            self.permission_endpoint = endpoint;
        }
        if let Some(value) = lookup("TALLY_PERMISSION_STALE_SECS") {
            self.permission_stale_secs = parse_secs("TALLY_PERMISSION_STALE_SECS", &value)?;
        }
        if let Some(value) = lookup("TALLY_PERMISSION_WAIT_SECS") {
            self.permission_wait_secs = parse_secs("TALLY_PERMISSION_WAIT_SECS", &value)?;
        }
        if let Some(value) = lookup("TALLY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_secs("TALLY_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(path) = lookup("TALLY_ROUTES_FILE") {
            self.routes_file = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("TALLY_DATA_PATH") {
            self.data_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(AccessError::Config("api_base_url must not be empty".to_string()));
        }
        if !self.permission_endpoint.starts_with('/') {
            return Err(AccessError::Config(format!(
                "permission_endpoint must start with '/': {}",
                self.permission_endpoint
            )));
        }
        if self.permission_wait_secs == 0 {
            return Err(AccessError::Config("permission_wait_secs must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AccessError::Config("request_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_endpoint(self.permission_endpoint.clone())
            .with_stale_after(Duration::from_secs(self.permission_stale_secs))
            .with_wait_timeout(Duration::from_secs(self.permission_wait_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_file(&self) -> PathBuf {
        self.data_path.join("session.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_path.join("logs")
    }

    /// Builds the route table from `routes_file`, or the built-in table.
    pub fn load_routes(&self) -> Result<RouteTable> {
        match &self.routes_file {
            Some(path) => {
                info!("Loading routes from {:?}", path);
                let content = std::fs::read_to_string(path)?;
                Ok(RouteTable::from_yaml(&content)?)
            }
            None => Ok(RouteTable::from_yaml(DEFAULT_ROUTES)?),
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| AccessError::Config(format!("{} must be a whole number of seconds, got '{}'", key, value)))
}
