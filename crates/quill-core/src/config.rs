//! Application configuration management.
//!
//! Holds the API location, endpoint paths, timeouts and token lifetime
//! policy, plus the last account used to log in.
//!
//! Configuration is stored at `~/.config/quill/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "quill";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
const ENV_API_URL: &str = "QUILL_API_URL";

/// Environment variable overriding `storage`
const ENV_STORAGE: &str = "QUILL_STORAGE";

/// Where the session record is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
}

impl StorageKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Some(StorageKind::File),
            "keyring" => Some(StorageKind::Keyring),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    /// Bound for ordinary API calls.
    pub request_timeout_secs: u64,
    /// Bound for login, refresh and logout. Must stay finite.
    pub auth_timeout_secs: u64,
    /// The proactive timer fires this long before the access token expires.
    pub refresh_threshold_secs: u64,
    /// `ensure_valid` starts a background refresh once the remaining
    /// lifetime drops to this window.
    pub renewal_window_secs: u64,
    /// Token lifetime assumed when the server omits `expiresIn`.
    pub fallback_token_lifetime_secs: u64,
    pub storage: StorageKind,
    pub last_account: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_path: "/auth/logout".to_string(),
            request_timeout_secs: 30,
            auth_timeout_secs: 10,
            refresh_threshold_secs: 5 * 60,
            renewal_window_secs: 10 * 60,
            fallback_token_lifetime_secs: 24 * 60 * 60,
            storage: StorageKind::File,
            last_account: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Some(kind) = std::env::var(ENV_STORAGE)
            .ok()
            .as_deref()
            .and_then(StorageKind::parse)
        {
            self.storage = kind;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Absolute URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        // Zero would disable the bound entirely.
        Duration::from_secs(self.auth_timeout_secs.max(1))
    }

    pub fn refresh_threshold(&self) -> chrono::Duration {
        saturating_seconds(self.refresh_threshold_secs)
    }

    pub fn renewal_window(&self) -> chrono::Duration {
        saturating_seconds(self.renewal_window_secs)
    }

    pub fn fallback_token_lifetime(&self) -> chrono::Duration {
        saturating_seconds(self.fallback_token_lifetime_secs)
    }
}

/// Out-of-range values clamp to the largest representable duration.
fn saturating_seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
