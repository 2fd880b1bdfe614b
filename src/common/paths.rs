//! Configuration and session state paths
//!
//! Unix/macOS: session state lives at $XDG_RUNTIME_DIR/behat-bridge or /tmp/behat-bridge-<uid>
//! Windows: session state lives in the platform data directory

use std::io;
use std::path::{Path, PathBuf};

/// Name used for config and state directories
const APP_NAME: &str = "behat-bridge";

/// Root config file names, in lookup order
pub const PROJECT_CONFIG_FILES: [&str; 3] = ["behat.yml", ".behat.yml", "behat.yml.dist"];

/// Get the default directory for persisted session state
///
/// Platform-specific:
/// - Unix: `$XDG_RUNTIME_DIR/behat-bridge` or `/tmp/behat-bridge-<uid>`
/// - Windows: `%LOCALAPPDATA%\behat-bridge\data\sessions`
#[cfg(unix)]
pub fn default_state_dir() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return PathBuf::from(runtime_dir).join(APP_NAME);
        }
    }

    // Fallback to /tmp with uid so users don't share sessions
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid))
}

#[cfg(windows)]
pub fn default_state_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_local_dir().join("sessions"))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

/// Ensure a state directory exists
///
/// On Unix, a newly created directory gets mode 0700
#[cfg(unix)]
pub fn ensure_state_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(windows)]
pub fn ensure_state_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/behat-bridge/`
/// - macOS: `~/Library/Application Support/behat-bridge/`
/// - Windows: `%APPDATA%\behat-bridge\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the tool configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Find the root behat config for a project, first existing candidate wins
pub fn find_project_config(root: &Path) -> Option<PathBuf> {
    PROJECT_CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_state_dir_is_valid() {
        let path = default_state_dir();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn test_find_project_config_prefers_behat_yml() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".behat.yml"), "default: {}").unwrap();
        std::fs::write(dir.path().join("behat.yml"), "default: {}").unwrap();
        assert_eq!(
            find_project_config(dir.path()),
            Some(dir.path().join("behat.yml"))
        );
    }

    #[test]
    fn test_find_project_config_missing() {
        let dir = tempdir().unwrap();
        assert!(find_project_config(dir.path()).is_none());
    }

    #[test]
    fn test_ensure_state_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_state_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
