//! # Application Configuration
//!
//! Settings are read from a YAML file and then overridden by environment
//! variables. A missing file is not an error: every field has a default.
//!
//! ```yaml
//! bind_address: "127.0.0.1:3000"
//! data_directory: "./data"
//! allowed_origin: "http://localhost:8080"
//! auto_approve_signups: true
//! recent_login_window_secs: 300
//! session_ttl_secs: 604800
//! notification_ttl_ms: 2500
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the YAML config file
pub const CONFIG_PATH_ENV: &str = "EXPENSE_TRACKER_CONFIG";
/// Environment variable overriding `data_directory`
pub const DATA_DIR_ENV: &str = "EXPENSE_TRACKER_DATA_DIR";
/// Environment variable overriding `bind_address`
pub const BIND_ENV: &str = "EXPENSE_TRACKER_BIND";

const DEFAULT_CONFIG_FILE: &str = "expense_tracker.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_address: SocketAddr,
    pub data_directory: PathBuf,
    /// Origin allowed by CORS
    pub allowed_origin: String,
    /// New accounts are usable right away when true, otherwise an admin
    /// has to flip `approved` on the profile
    pub auto_approve_signups: bool,
    /// How long a verified login counts as recent for password changes
    /// and account deletion
    pub recent_login_window_secs: u64,
    /// Lifetime of a bearer token issued on sign-in
    pub session_ttl_secs: u64,
    pub notification_ttl_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_directory: PathBuf::from("data"),
            allowed_origin: "http://localhost:8080".to_string(),
            auto_approve_signups: true,
            recent_login_window_secs: 300,
            session_ttl_secs: 7 * 24 * 60 * 60,
            notification_ttl_ms: shared::DEFAULT_DISMISS_MS,
        }
    }
}

impl AppConfig {
    /// Load from `$EXPENSE_TRACKER_CONFIG` (or `expense_tracker.yaml`), then
    /// apply environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::from_file_or_default(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        let config = Self::from_yaml(&yaml).with_context(|| format!("parsing {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a closure in tests)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.data_directory = PathBuf::from(dir);
        }
        if let Some(bind) = lookup(BIND_ENV) {
            self.bind_address = bind
                .parse()
                .with_context(|| format!("{} is not a socket address: {}", BIND_ENV, bind))?;
        }
        Ok(())
    }

    pub fn recent_login_window(&self) -> chrono::Duration {
        seconds(self.recent_login_window_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        seconds(self.session_ttl_secs)
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs.min(i64::MAX as u64) as i64).unwrap_or(chrono::Duration::MAX)
}
