//! Progress persistence behind a small trait:
//! - `FileStore`: one pretty-printed JSON document per session key.
//! - `MemoryStore`: in-process map of JSON strings, for tests and
//!   ephemeral deployments.
//!
//! Loading is deliberately forgiving. A missing document is a normal
//! first run and a corrupt one must never take the course down, so both
//! read back as `None` and the session starts fresh.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use crate::domain::SessionSnapshot;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistenceError {
    #[error("progress io: {0}")]
    Io(#[from] io::Error),
    #[error("progress encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait ProgressStore: Send + Sync {
    fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<(), PersistenceError>;
    /// `None` covers both "never saved" and "unreadable".
    fn load(&self, key: &str) -> Option<SessionSnapshot>;
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Stores each snapshot as `<root>/<key>.json`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl ProgressStore for FileStore {
    fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.root)?;
        let body = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(self.path_for(key), body)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Option<SessionSnapshot> {
        let path = self.path_for(key);
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(target: "course", path = %path.display(), error = %e, "Unreadable progress document, starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(target: "course", path = %path.display(), error = %e, "Corrupt progress document, starting fresh");
                None
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the serialized form, not the struct, so a load exercises the
/// same decode path as the file store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ProgressStore for MemoryStore {
    fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        let body = serde_json::to_string_pretty(snapshot)?;
        self.entries().insert(key.to_string(), body);
        Ok(())
    }

    fn load(&self, key: &str) -> Option<SessionSnapshot> {
        let body = self.entries().get(key).cloned()?;
        match serde_json::from_str(&body) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(target: "course", key, error = %e, "Corrupt stored progress, starting fresh");
                None
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Directory for `FileStore`, from `COURSE_DATA_DIR` or `./data`.
pub fn data_dir_from_env() -> PathBuf {
    match std::env::var("COURSE_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => Path::new(&dir).to_path_buf(),
        _ => PathBuf::from("./data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    fn sample() -> SessionSnapshot {
        let mut validated = BTreeMap::new();
        validated.insert("debutant".to_string(), vec![1, 2, 8]);
        SessionSnapshot {
            level: Some("debutant".to_string()),
            step_index: 3,
            validated_by_level: validated,
            badges: vec!["badge-micro1".to_string(), "badge-micro2".to_string()],
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let snap = sample();
        store.save("poo-course-progress-a", &snap).expect("save");
        assert_eq!(store.load("poo-course-progress-a"), Some(snap));
    }

    #[test]
    fn file_store_round_trips_an_empty_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let snap = SessionSnapshot {
            level: None,
            step_index: 0,
            validated_by_level: BTreeMap::new(),
            badges: vec![],
            started_at: Utc::now(),
        };
        store.save("k", &snap).expect("save");
        assert_eq!(store.load("k"), Some(snap));
    }

    #[test]
    fn missing_document_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        assert_eq!(store.load("never-saved"), None);
    }

    #[test]
    fn corrupt_document_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        std::fs::write(dir.path().join("bad.json"), "{not json").expect("write");
        assert_eq!(store.load("bad"), None);
    }

    #[test]
    fn identical_snapshots_serialize_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let snap = sample();
        store.save("a", &snap).expect("save");
        store.save("b", &snap.clone()).expect("save");
        let a = std::fs::read(dir.path().join("a.json")).expect("read");
        let b = std::fs::read(dir.path().join("b.json")).expect("read");
        assert_eq!(a, b);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        store.save("k", &sample()).expect("save");
        store.remove("k").expect("first remove");
        store.remove("k").expect("second remove");
        assert_eq!(store.load("k"), None);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        let snap = sample();
        store.save("k", &snap).expect("save");
        assert_eq!(store.load("k"), Some(snap));
        store.remove("k").expect("remove");
        assert_eq!(store.load("k"), None);
    }
}
