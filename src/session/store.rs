//! Persisted test session state
//!
//! The state blob is the only channel between the test runner and the
//! application under test. Every write replaces the whole blob for a key:
//! callers read, mutate their copy and write it back. There is no locking,
//! so two processes writing the same key concurrently can lose an update.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::common::paths::ensure_state_dir;
use crate::common::{Error, Result};

use super::mailer::EmailRecord;

/// Session state shared across processes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSessionState {
    /// Captured outgoing emails, in send order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<EmailRecord>>,

    /// Fields owned by other collaborators, kept as-is
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl TestSessionState {
    pub fn is_empty(&self) -> bool {
        self.emails.is_none() && self.other.is_empty()
    }
}

/// Storage for session state blobs
pub trait StateStore {
    /// Read the state for a key; a missing session is an empty state
    fn get_state(&self, key: &str) -> Result<TestSessionState>;

    /// Overwrite the state for a key
    fn apply_state(&self, key: &str, state: &TestSessionState) -> Result<()>;

    /// Drop the state for a key
    fn clear_state(&self, key: &str) -> Result<()>;
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn get_state(&self, key: &str) -> Result<TestSessionState> {
        (**self).get_state(key)
    }

    fn apply_state(&self, key: &str, state: &TestSessionState) -> Result<()> {
        (**self).apply_state(key, state)
    }

    fn clear_state(&self, key: &str) -> Result<()> {
        (**self).clear_state(key)
    }
}

/// Check that a session key is safe to use as a file name
pub fn validate_session_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSessionKey(key.to_string()))
    }
}

/// One JSON file per session key
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the state for a key
    pub fn state_path(&self, key: &str) -> Result<PathBuf> {
        validate_session_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn write_atomic(&self, path: &Path, state: &TestSessionState) -> io::Result<()> {
        ensure_state_dir(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get_state(&self, key: &str) -> Result<TestSessionState> {
        let path = self.state_path(key)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(TestSessionState::default())
            }
            Err(e) => return Err(Error::state_store(key, e)),
        };
        if content.trim().is_empty() {
            return Ok(TestSessionState::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            Error::state_store(key, format!("corrupt state file {}: {}", path.display(), e))
        })
    }

    fn apply_state(&self, key: &str, state: &TestSessionState) -> Result<()> {
        let path = self.state_path(key)?;
        self.write_atomic(&path, state)
            .map_err(|e| Error::state_store(key, e))?;
        tracing::trace!(key, path = %path.display(), "Applied session state");
        Ok(())
    }

    fn clear_state(&self, key: &str) -> Result<()> {
        let path = self.state_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::state_store(key, e)),
        }
    }
}

/// In-process store
///
/// Blobs are kept serialized so readers get a fresh copy, as with a file.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get_state(&self, key: &str) -> Result<TestSessionState> {
        validate_session_key(key)?;
        let states = self
            .states
            .lock()
            .map_err(|_| Error::state_store(key, "state lock poisoned"))?;
        match states.get(key) {
            Some(blob) => Ok(serde_json::from_str(blob)?),
            None => Ok(TestSessionState::default()),
        }
    }

    fn apply_state(&self, key: &str, state: &TestSessionState) -> Result<()> {
        validate_session_key(key)?;
        let blob = serde_json::to_string(state)?;
        self.states
            .lock()
            .map_err(|_| Error::state_store(key, "state lock poisoned"))?
            .insert(key.to_string(), blob);
        Ok(())
    }

    fn clear_state(&self, key: &str) -> Result<()> {
        validate_session_key(key)?;
        self.states
            .lock()
            .map_err(|_| Error::state_store(key, "state lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// A state store bound to one session key
#[derive(Debug, Clone)]
pub struct TestSessionEnvironment<S> {
    store: S,
    key: String,
}

impl<S: StateStore> TestSessionEnvironment<S> {
    pub fn new(store: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_session_key(&key)?;
        Ok(Self { store, key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get_state(&self) -> Result<TestSessionState> {
        self.store.get_state(&self.key)
    }

    pub fn apply_state(&self, state: &TestSessionState) -> Result<()> {
        self.store.apply_state(&self.key, state)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear_state(&self.key)
    }

    /// One read-modify-write cycle
    pub fn update<T>(&self, f: impl FnOnce(&mut TestSessionState) -> T) -> Result<T> {
        let mut state = self.get_state()?;
        let out = f(&mut state);
        self.apply_state(&state)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(subject: &str) -> EmailRecord {
        EmailRecord {
            subject: Some(subject.to_string()),
            ..EmailRecord::default()
        }
    }

    #[test]
    fn test_missing_session_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("sessions"));
        let state = store.get_state("nobody").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_file_store_round_trip_keeps_foreign_fields() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        std::fs::write(
            dir.path().join("s1.json"),
            r#"{"database": "ss_tmpdb_1", "emails": [{"Subject": "Hi"}]}"#,
        )
        .unwrap();

        let mut state = store.get_state("s1").unwrap();
        assert_eq!(state.emails.as_ref().unwrap().len(), 1);
        state.emails.as_mut().unwrap().push(record("Second"));
        store.apply_state("s1", &state).unwrap();

        let reread = store.get_state("s1").unwrap();
        assert_eq!(reread.emails.unwrap().len(), 2);
        assert_eq!(
            reread.other.get("database"),
            Some(&serde_json::json!("ss_tmpdb_1"))
        );
    }

    #[test]
    fn test_apply_overwrites_whole_blob() {
        let store = MemoryStateStore::new();
        let mut state = TestSessionState::default();
        state
            .other
            .insert("flag".to_string(), serde_json::json!(true));
        store.apply_state("k", &state).unwrap();

        store
            .apply_state("k", &TestSessionState::default())
            .unwrap();
        assert!(store.get_state("k").unwrap().is_empty());
    }

    #[test]
    fn test_clear_state() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        store
            .apply_state("k", &TestSessionState::default())
            .unwrap();
        assert!(dir.path().join("k.json").exists());
        store.clear_state("k").unwrap();
        assert!(!dir.path().join("k.json").exists());
        store.clear_state("k").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(matches!(
            store.get_state("bad"),
            Err(Error::StateStore { .. })
        ));
    }

    #[test]
    fn test_session_key_validation() {
        assert!(validate_session_key("behat-1.test_a").is_ok());
        for key in ["", ".hidden", "../escape", "a/b", "with space"] {
            assert!(
                matches!(validate_session_key(key), Err(Error::InvalidSessionKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_interleaved_writers_lose_an_update() {
        // Two processes sharing one session: both read before either writes.
        let dir = tempdir().unwrap();
        let runner = TestSessionEnvironment::new(FileStateStore::new(dir.path()), "shared").unwrap();
        let app = TestSessionEnvironment::new(FileStateStore::new(dir.path()), "shared").unwrap();

        let mut runner_copy = runner.get_state().unwrap();
        let mut app_copy = app.get_state().unwrap();

        runner_copy.emails.get_or_insert_with(Vec::new).push(record("from runner"));
        app_copy.emails.get_or_insert_with(Vec::new).push(record("from app"));

        runner.apply_state(&runner_copy).unwrap();
        app.apply_state(&app_copy).unwrap();

        let emails = runner.get_state().unwrap().emails.unwrap();
        assert_eq!(emails, vec![record("from app")]);
    }

    #[test]
    fn test_update_is_read_modify_write() {
        let env = TestSessionEnvironment::new(MemoryStateStore::new(), "k").unwrap();
        let count = env
            .update(|state| {
                state.emails.get_or_insert_with(Vec::new).push(record("a"));
                state.emails.as_ref().map_or(0, Vec::len)
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(env.get_state().unwrap().emails.unwrap().len(), 1);
    }
}
