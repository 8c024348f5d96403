//! Application state: the course catalog, live sessions, and the
//! progress store.
//!
//! This module owns:
//!   - the immutable catalog (built-ins merged with the TOML overlay)
//!   - the live session registry (by session id)
//!   - the progress store used to restore and persist sessions
//!
//! Sessions are restored lazily: attaching with a remembered id first
//! checks the live registry, then the store, then falls back to a fresh
//! session under that id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::load_course_config_from_env;
use crate::session::{SessionState, StateError};
use crate::store::{data_dir_from_env, FileStore, ProgressStore};

// Store documents are namespaced so a shared data directory stays legible.
const STORE_KEY_PREFIX: &str = "poo-course-progress";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub sessions: Arc<RwLock<HashMap<Uuid, SessionState>>>,
    pub store: Arc<dyn ProgressStore>,
}

impl AppState {
    /// Build state from env: load the config overlay, assemble the
    /// catalog, and open the file-backed progress store.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg_opt = load_course_config_from_env();
        let catalog = Catalog::with_overlay(cfg_opt);

        let data_dir = data_dir_from_env();
        info!(target: "poo_backend", dir = %data_dir.display(), "Progress store directory");
        let store = FileStore::new(data_dir);

        Self::with_store(catalog, Arc::new(store))
    }

    /// Build state around an explicit catalog and store.
    pub fn with_store(catalog: Catalog, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    fn store_key(id: &Uuid) -> String {
        format!("{STORE_KEY_PREFIX}-{id}")
    }

    /// Attach to a session: reuse it live, restore it from the store, or
    /// start fresh. Returns the effective id and whether prior state was
    /// found (live or restored).
    #[instrument(level = "debug", skip(self))]
    pub async fn attach_session(&self, requested: Option<Uuid>) -> (Uuid, bool) {
        let Some(id) = requested else {
            let id = Uuid::new_v4();
            self.sessions.write().await.insert(id, SessionState::new(Utc::now()));
            info!(target: "course", session = %id, "Started fresh session");
            return (id, false);
        };

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return (id, true);
        }

        match self.store.load(&Self::store_key(&id)) {
            Some(snap) => match SessionState::from_snapshot(&self.catalog, snap) {
                Ok(state) => {
                    info!(target: "course", session = %id, level = ?state.level(), "Restored session from store");
                    sessions.insert(id, state);
                    (id, true)
                }
                Err(e) => {
                    warn!(target: "course", session = %id, error = %e, "Stored session rejected by catalog, starting fresh");
                    sessions.insert(id, SessionState::new(Utc::now()));
                    (id, false)
                }
            },
            None => {
                sessions.insert(id, SessionState::new(Utc::now()));
                info!(target: "course", session = %id, "No stored progress, starting fresh");
                (id, false)
            }
        }
    }

    /// Run a closure against a live session under the write lock.
    /// `None` means the id is unknown.
    pub async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Option<T> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).map(f)
    }

    /// Run a closure against a live session under the read lock.
    pub async fn read_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&SessionState) -> T,
    ) -> Option<T> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).map(f)
    }

    /// Apply a fallible transition under the write lock. The outer
    /// `None` is an unknown session; the inner `Result` is the
    /// transition's own outcome.
    pub async fn try_with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionState, &Catalog) -> Result<T, StateError>,
    ) -> Option<Result<T, StateError>> {
        let catalog = self.catalog.clone();
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).map(|s| f(s, catalog.as_ref()))
    }

    /// Persist one session. Returns false when the id is unknown or the
    /// store write fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn save_session(&self, id: Uuid) -> bool {
        let snapshot = {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(s) => s.snapshot(),
                None => return false,
            }
        };
        match self.store.save(&Self::store_key(&id), &snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "course", session = %id, error = %e, "Failed to persist session");
                false
            }
        }
    }

    /// Persist every live session; returns how many saves succeeded.
    #[instrument(level = "debug", skip_all)]
    pub async fn save_all(&self) -> usize {
        let snapshots: Vec<(Uuid, _)> = {
            let sessions = self.sessions.read().await;
            sessions.iter().map(|(id, s)| (*id, s.snapshot())).collect()
        };
        let mut saved = 0;
        for (id, snapshot) in snapshots {
            match self.store.save(&Self::store_key(&id), &snapshot) {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(target: "course", session = %id, error = %e, "Failed to persist session");
                }
            }
        }
        saved
    }

    /// Wipe a session's progress, both live and stored. Returns false
    /// when the id is unknown.
    #[instrument(level = "info", skip(self))]
    pub async fn reset_session(&self, id: Uuid) -> bool {
        let existed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(&id) {
                Some(s) => {
                    s.reset(Utc::now());
                    true
                }
                None => false,
            }
        };
        if existed {
            if let Err(e) = self.store.remove(&Self::store_key(&id)) {
                warn!(target: "course", session = %id, error = %e, "Failed to remove stored progress");
            }
        }
        existed
    }

    /// Drop a session from the registry and the store.
    #[instrument(level = "info", skip(self))]
    pub async fn drop_session(&self, id: Uuid) -> bool {
        let existed = self.sessions.write().await.remove(&id).is_some();
        if existed {
            if let Err(e) = self.store.remove(&Self::store_key(&id)) {
                warn!(target: "course", session = %id, error = %e, "Failed to remove stored progress");
            }
        }
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn memory_state() -> AppState {
        AppState::with_store(Catalog::builtin(), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn attach_without_id_starts_fresh() {
        let state = memory_state();
        let (id, restored) = state.attach_session(None).await;
        assert!(!restored);
        let level = state.read_session(id, |s| s.level().map(String::from)).await;
        assert_eq!(level, Some(None));
    }

    #[tokio::test]
    async fn attach_with_live_id_reuses_the_session() {
        let state = memory_state();
        let (id, _) = state.attach_session(None).await;
        state
            .try_with_session(id, |s, c| s.select_level(c, "debutant"))
            .await
            .expect("live session")
            .expect("known level");
        let (again, restored) = state.attach_session(Some(id)).await;
        assert_eq!(again, id);
        assert!(restored);
    }

    #[tokio::test]
    async fn attach_restores_from_the_store() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Catalog::builtin();
        let id = Uuid::new_v4();

        {
            let state = AppState::with_store(Catalog::builtin(), store.clone());
            let (attached, _) = state.attach_session(Some(id)).await;
            state
                .try_with_session(attached, |s, c| s.select_level(c, "debutant"))
                .await
                .expect("live")
                .expect("known level");
            assert!(state.save_session(attached).await);
        }

        // A fresh registry backed by the same store sees the progress.
        let state = AppState::with_store(catalog, store);
        let (attached, restored) = state.attach_session(Some(id)).await;
        assert_eq!(attached, id);
        assert!(restored);
        let level = state
            .read_session(id, |s| s.level().map(String::from))
            .await
            .expect("live");
        assert_eq!(level.as_deref(), Some("debutant"));
    }

    #[tokio::test]
    async fn attach_with_unknown_id_keeps_the_requested_id() {
        let state = memory_state();
        let id = Uuid::new_v4();
        let (attached, restored) = state.attach_session(Some(id)).await;
        assert_eq!(attached, id);
        assert!(!restored);
    }

    #[tokio::test]
    async fn reset_clears_live_and_stored_progress() {
        let state = memory_state();
        let (id, _) = state.attach_session(None).await;
        state
            .try_with_session(id, |s, c| s.select_level(c, "debutant"))
            .await
            .expect("live")
            .expect("known level");
        assert!(state.save_session(id).await);
        assert!(state.reset_session(id).await);
        let level = state.read_session(id, |s| s.level().map(String::from)).await;
        assert_eq!(level, Some(None));
        assert!(state.store.load(&AppState::store_key(&id)).is_none());
    }

    #[tokio::test]
    async fn save_all_covers_every_live_session() {
        let state = memory_state();
        let (a, _) = state.attach_session(None).await;
        let (b, _) = state.attach_session(None).await;
        assert_eq!(state.save_all().await, 2);
        assert!(state.store.load(&AppState::store_key(&a)).is_some());
        assert!(state.store.load(&AppState::store_key(&b)).is_some());
    }
}
