//! Persisted settings: the polling interval and the list of targets to keep in sync.
//!
//! Settings are re-read from disk at the start of every cycle into a fresh
//! [`SyncConfig`] value; nothing mutates a loaded configuration in place.

use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up beside the executable and in the user config directory.
pub const CONFIG_FILE_NAME: &str = "hotspot-sync.toml";

/// Settings file name used by earlier deployments.
pub const LEGACY_CONFIG_FILE_NAME: &str = "setting.json";

/// Built-in trial account present on every hotspot device.
pub const DEFAULT_RESERVED_ACCOUNT: &str = "default-trial";

fn default_interval_minutes() -> u64 {
    1
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_reserved_account() -> String {
    DEFAULT_RESERVED_ACCOUNT.to_string()
}

fn default_max_concurrent_targets() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_failure_log_every() -> u32 {
    10
}

/// Top-level settings for the sync daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minutes between the end of one cycle and the start of the next
    #[serde(default = "default_interval_minutes", alias = "Interval")]
    pub interval_minutes: u64,
    /// Upper bound for every individual roster or device call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Device account that is never touched
    #[serde(default = "default_reserved_account")]
    pub reserved_account: String,
    /// Account names that are never removed, on any target
    #[serde(default)]
    pub protected_accounts: Vec<String>,
    /// How many targets are reconciled at the same time
    #[serde(default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: usize,
    /// Replace Turkish letters with ASCII in account comments
    #[serde(default = "default_true")]
    pub transliterate_labels: bool,
    /// After the first failure, log a repeating failure at error level only
    /// every N consecutive cycles
    #[serde(default = "default_failure_log_every")]
    pub failure_log_every: u32,
    #[serde(default, alias = "Settings")]
    pub targets: Vec<Target>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            reserved_account: default_reserved_account(),
            protected_accounts: Vec::new(),
            max_concurrent_targets: default_max_concurrent_targets(),
            transliterate_labels: true,
            failure_log_every: default_failure_log_every(),
            targets: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse settings text. `.json` paths are read as JSON, everything else as TOML.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let parsed = if is_json {
            serde_json::from_str::<SyncConfig>(contents).map_err(|e| e.to_string())
        } else {
            toml::from_str::<SyncConfig>(contents).map_err(|e| e.to_string())
        };

        let config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_targets == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_targets must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            let name = target.display_name();
            if target.roster_address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}' has no roster address",
                    name
                )));
            }
            if target.device_address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}' has no device address",
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "target '{}' is configured more than once",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Global and per-target protected account names combined.
    pub fn protected_accounts_for(&self, target: &Target) -> HashSet<String> {
        self.protected_accounts
            .iter()
            .chain(target.protected_accounts.iter())
            .cloned()
            .collect()
    }
}

/// One roster source paired with one hotspot device.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub name: Option<String>,
    /// Host (optionally with port or scheme) of the property-management service
    #[serde(alias = "ServerAddress")]
    pub roster_address: String,
    /// Profile name passed to the roster service as the `name` query parameter
    #[serde(alias = "Profile")]
    pub roster_profile: String,
    /// Device API address, `host` or `host:port`
    #[serde(alias = "MikrotikAddress")]
    pub device_address: String,
    #[serde(alias = "MikrotikUsername")]
    pub device_username: String,
    #[serde(default, alias = "MikrotikPassword")]
    pub device_password: String,
    /// Only accounts in this user profile are managed; also the profile for new accounts
    #[serde(default, alias = "CustomerProfileName")]
    pub account_profile: Option<String>,
    #[serde(default)]
    pub protected_accounts: Vec<String>,
}

impl Target {
    /// Name used in logs and reports.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{}@{}", self.roster_profile, self.device_address),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("roster_address", &self.roster_address)
            .field("roster_profile", &self.roster_profile)
            .field("device_address", &self.device_address)
            .field("device_username", &self.device_username)
            .field("device_password", &"<redacted>")
            .field("account_profile", &self.account_profile)
            .field("protected_accounts", &self.protected_accounts)
            .finish()
    }
}

/// Something that yields the current settings.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<SyncConfig, ConfigError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Settings re-read from a file on every call.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<SyncConfig, ConfigError> {
        SyncConfig::load(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Fixed settings held in memory.
#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    config: SyncConfig,
}

impl StaticConfigSource {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }

    fn describe(&self) -> String {
        "in-memory settings".to_string()
    }
}

/// Locate the settings file when none is given on the command line.
///
/// Files beside the executable win (`hotspot-sync.toml`, then the legacy
/// `setting.json`); otherwise the per-user config directory is used.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        for candidate in [CONFIG_FILE_NAME, LEGACY_CONFIG_FILE_NAME] {
            let path = dir.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    ProjectDirs::from("", "", "hotspot-sync").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
