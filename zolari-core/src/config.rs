//! Configuration system for Zolari.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/zolari/config.toml` and/or `.zolari/config.toml`
//! in the workspace directory. The compiled-in defaults point at the production tenant and
//! webhooks, so a fresh install needs no configuration at all.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Identity provider tenant.
pub const DEFAULT_IDENTITY_DOMAIN: &str = "zulari.us.auth0.com";
/// Public client registered with the identity provider.
pub const DEFAULT_CLIENT_ID: &str = "SZyZyloyXAdK8irLulgvjIZs59PSsEV8";
/// Webhook accepting new research requests.
pub const DEFAULT_SUBMIT_URL: &str = "https://zolari.app.n8n.cloud/webhook-test/submit-research";
/// Webhook returning a user's research records.
pub const DEFAULT_RESULTS_URL: &str =
    "https://zolari.app.n8n.cloud/webhook-test/get-user-research";
/// Port of the loopback server that receives the login redirect.
pub const DEFAULT_CALLBACK_PORT: u16 = 8844;
/// Fixed polling cadence for research results.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZolariConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
    /// Tenant domain, without scheme.
    pub domain: String,
    pub client_id: String,
    /// Application origin the provider redirects back to after login and logout.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Optional API audience for access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_IDENTITY_DOMAIN.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: format!("http://localhost:{}", DEFAULT_CALLBACK_PORT),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
            audience: None,
        }
    }
}

impl IdentityConfig {
    /// Base URL of the tenant. A domain given with a scheme is used as-is.
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.base_url())
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url())
    }

    pub fn userinfo_url(&self) -> String {
        format!("{}/userinfo", self.base_url())
    }

    pub fn logout_url(&self) -> String {
        format!("{}/v2/logout", self.base_url())
    }
}

/// Research workflow endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub submit_url: String,
    pub results_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            submit_url: DEFAULT_SUBMIT_URL.to_string(),
            results_url: DEFAULT_RESULTS_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Result polling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshConfig {
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ZolariConfig {
    /// Reject values that would break the client at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "refresh.interval_secs must be positive".to_string(),
            });
        }
        if self.identity.domain.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "identity.domain must not be empty".to_string(),
            });
        }
        if self.identity.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "identity.client_id must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("identity.redirect_uri", &self.identity.redirect_uri),
            ("service.submit_url", &self.service.submit_url),
            ("service.results_url", &self.service.results_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::Invalid {
                message: format!("{} is not a valid URL: {}", field, e),
            })?;
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("app", "zolari", "zolari")
}

/// User-level config file path (`~/.config/zolari/config.toml` on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Workspace-level config file path.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".zolari").join("config.toml")
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration by merging all sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `ZOLARI_`)
/// 3. Workspace-local config (`.zolari/config.toml`)
/// 4. User config (`~/.config/zolari/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ZolariConfig>,
) -> Result<ZolariConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ZolariConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // ZOLARI_SERVICE__RESULTS_URL, ZOLARI_REFRESH__INTERVAL_SECS, etc.
    figment = figment.merge(Env::prefixed("ZOLARI_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: ZolariConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Write the default configuration to the workspace config file.
///
/// Refuses to overwrite an existing file. Returns the path written.
pub fn write_default_config(workspace: &Path) -> anyhow::Result<PathBuf> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        anyhow::bail!("configuration already exists at {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&ZolariConfig::default())?;
    std::fs::write(&path, content)?;
    Ok(path)
}
