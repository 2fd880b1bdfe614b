//! Error types for behat-bridge
//!
//! Suite resolution errors are fatal and abort the run; messages name the
//! offending module, suite or path so the fix is obvious from the output.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for behat-bridge
#[derive(Error, Debug)]
pub enum Error {
    // === Module Reference Errors ===
    #[error("Invalid module reference '{0}'. Use @modulename or @vendor/modulename")]
    InvalidModuleReference(String),

    #[error("Module reference '{name}' is ambiguous, matches: {candidates}. Qualify it as @vendor/{name}")]
    AmbiguousModuleReference { name: String, candidates: String },

    #[error("No module found matching '{0}'")]
    ModuleNotFound(String),

    // === Suite Errors ===
    #[error("Could not find suite config {0}")]
    SuiteNotFound(String),

    #[error("No behat.yml found for module {module}. Searched: {searched}")]
    ConfigFileNotFound { module: String, searched: String },

    #[error("Path {path} does not contain default.suites.{suite} config")]
    SuiteConfigMissing { path: String, suite: String },

    #[error("Suite '{0}' is already registered with a different configuration")]
    SuiteAlreadyRegistered(String),

    #[error("Parameter interpolation failed: {0}")]
    Interpolation(String),

    // === Session State Errors ===
    #[error("Invalid session key '{0}'. Use letters, digits, '.', '_' or '-'")]
    InvalidSessionKey(String),

    #[error("State store error for session '{key}': {message}")]
    StateStore { key: String, message: String },

    // === Email Errors ===
    #[error("Invalid email pattern '{pattern}': {reason}")]
    InvalidEmailPattern { pattern: String, reason: String },

    #[error("Mail transport failed: {0}")]
    Transport(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an ambiguous module error listing every candidate
    pub fn ambiguous_module<S: AsRef<str>>(name: &str, candidates: &[S]) -> Self {
        Self::AmbiguousModuleReference {
            name: name.to_string(),
            candidates: candidates
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a config file not found error with the searched candidates
    pub fn config_file_not_found<P: AsRef<Path>>(module: &str, searched: &[P]) -> Self {
        Self::ConfigFileNotFound {
            module: module.to_string(),
            searched: searched
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a missing suite config error
    pub fn suite_config_missing(path: &Path, suite: &str) -> Self {
        Self::SuiteConfigMissing {
            path: path.display().to_string(),
            suite: suite.to_string(),
        }
    }

    /// Create a state store error for a session key
    pub fn state_store(key: &str, message: impl ToString) -> Self {
        Self::StateStore {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an invalid email pattern error
    pub fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        Self::InvalidEmailPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &Path, error: io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Whether this error belongs to suite resolution (fatal for a run)
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidModuleReference(_)
                | Error::AmbiguousModuleReference { .. }
                | Error::ModuleNotFound(_)
                | Error::SuiteNotFound(_)
                | Error::ConfigFileNotFound { .. }
                | Error::SuiteConfigMissing { .. }
                | Error::Interpolation(_)
        )
    }
}
