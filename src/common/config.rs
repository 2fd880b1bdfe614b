//! Configuration file handling
//!
//! Two sources: the tool's own `config.toml` (where the project lives, where
//! session state is kept) and the project's root `behat.yml`, which carries
//! the extension settings and the static suite catalog.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

use super::paths::{config_path, default_state_dir, find_project_config};
use super::{Error, Result};

/// Environment variable overriding the configured session key
pub const SESSION_ENV: &str = "BEHAT_BRIDGE_SESSION";

/// Parameter namespace for extension settings
pub const EXTENSION_ID: &str = "silverstripe_extension";

/// Keys under `default.extensions` that hold our settings
const EXTENSION_KEYS: [&str; 2] = [EXTENSION_ID, "SilverStripe\\BehatExtension\\Extension"];

/// Main tool configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Project settings
    #[serde(default)]
    pub project: ProjectSettings,

    /// Module discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Session state settings
    #[serde(default)]
    pub session: SessionConfig,
}

/// Project location
#[derive(Debug, Deserialize, Default)]
pub struct ProjectSettings {
    /// Project root; the current directory when unset
    pub root: Option<PathBuf>,
}

/// Module discovery settings
#[derive(Debug, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory (relative to the project root) holding vendor modules
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            vendor_dir: default_vendor_dir(),
        }
    }
}

fn default_vendor_dir() -> String {
    "vendor".to_string()
}

/// Session state settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Session key shared by the test runner and the application
    #[serde(default = "default_session_key")]
    pub key: String,

    /// Where session state files live
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: default_session_key(),
            state_dir: None,
        }
    }
}

fn default_session_key() -> String {
    "default".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Project root: explicit override, then config, then the current directory
    pub fn project_root(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit.or(self.project.root.as_deref()) {
            Some(root) => Ok(root.to_path_buf()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Session key: explicit override, then `BEHAT_BRIDGE_SESSION`, then config
    pub fn session_key(&self, explicit: Option<&str>) -> String {
        if let Some(key) = explicit {
            return key.to_string();
        }
        match std::env::var(SESSION_ENV) {
            Ok(key) if !key.is_empty() => key,
            _ => self.session.key.clone(),
        }
    }

    /// Directory for persisted session state
    pub fn state_dir(&self) -> PathBuf {
        self.session
            .state_dir
            .clone()
            .unwrap_or_else(default_state_dir)
    }
}

/// Extension settings from `default.extensions.silverstripe_extension`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtensionSettings {
    /// Where failure screenshots are written
    #[serde(default)]
    pub screenshot_path: Option<String>,

    /// Named page regions used by region steps
    #[serde(default)]
    pub region_map: Mapping,

    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Ajax wait timeout in milliseconds
    #[serde(default = "default_ajax_timeout")]
    pub ajax_timeout: u64,

    #[serde(default)]
    pub bootstrap_file: Option<String>,

    /// Error level the retrying call handler catches
    #[serde(default = "default_error_reporting")]
    pub error_reporting: i64,

    /// Number of seconds that @retry tags will retry for
    #[serde(default = "default_retry_seconds")]
    pub retry_seconds: u64,

    /// Step prefixes that wait for ajax to settle
    #[serde(default = "default_ajax_steps")]
    pub ajax_steps: Vec<String>,

    #[serde(default)]
    pub context: ContextSettings,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            screenshot_path: None,
            region_map: Mapping::new(),
            admin_url: default_admin_url(),
            login_url: default_login_url(),
            ajax_timeout: default_ajax_timeout(),
            bootstrap_file: None,
            error_reporting: default_error_reporting(),
            retry_seconds: default_retry_seconds(),
            ajax_steps: default_ajax_steps(),
            context: ContextSettings::default(),
        }
    }
}

/// Context settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContextSettings {
    /// Module-relative directory that may hold a nested behat.yml
    #[serde(default = "default_features_path")]
    pub features_path: String,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            features_path: default_features_path(),
        }
    }
}

fn default_admin_url() -> String {
    "/admin/".to_string()
}
fn default_login_url() -> String {
    "/Security/login".to_string()
}
fn default_ajax_timeout() -> u64 {
    5000
}
fn default_error_reporting() -> i64 {
    // E_ALL | E_STRICT
    32767
}
fn default_retry_seconds() -> u64 {
    2
}
fn default_ajax_steps() -> Vec<String> {
    ["go to", "follow", "press", "click", "submit"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_features_path() -> String {
    "tests/behat".to_string()
}

/// The project's root behat config
#[derive(Debug, Default)]
pub struct ProjectConfig {
    /// File the config was read from, if any
    pub path: Option<PathBuf>,

    /// Extension settings
    pub extension: ExtensionSettings,

    /// Raw `default.suites` mapping, not yet interpolated
    pub suites: Mapping,
}

impl ProjectConfig {
    /// Load the root config for a project
    ///
    /// An explicit path must exist; otherwise the first of `behat.yml`,
    /// `.behat.yml`, `behat.yml.dist` is used, and a project without any of
    /// them gets default settings and no static suites.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_project_config(root),
        };
        match path {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!(root = %root.display(), "No root behat config, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load a root config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let mut config = Self::parse(&content)
            .map_err(|e| Error::ConfigParse(format!("{}: {}", path.display(), e)))?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse root config text
    pub fn parse(content: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        let profile = root.get("default");

        let extension = match profile
            .and_then(|p| p.get("extensions"))
            .and_then(|ext| EXTENSION_KEYS.iter().find_map(|key| ext.get(*key)))
        {
            Some(Value::Null) | None => ExtensionSettings::default(),
            Some(value) => serde_yaml::from_value(value.clone())?,
        };

        let suites = match profile.and_then(|p| p.get("suites")) {
            Some(Value::Mapping(suites)) => suites.clone(),
            Some(Value::Null) | None => Mapping::new(),
            Some(_) => {
                return Err(Error::Config(
                    "default.suites must be a mapping of suite name to settings".to_string(),
                ))
            }
        };

        Ok(Self {
            path: None,
            extension,
            suites,
        })
    }
}
