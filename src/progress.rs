use crate::debounce::Debouncer;
use crate::session::PersistedSnapshot;
use crate::store::KeyValueStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const KEY_PREFIX: &str = "lesson-progress:";
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(120);

pub fn storage_key(lesson_id: &str) -> String {
    format!("{KEY_PREFIX}{lesson_id}")
}

struct Backend {
    store: Arc<dyn KeyValueStore>,
    writer: Debouncer,
}

/// Per-lesson progress snapshots on top of a [`KeyValueStore`].
///
/// Failures never reach the caller: a broken or missing store means saves
/// are dropped and loads find nothing.
pub struct ProgressStore {
    backend: Option<Backend>,
}

impl ProgressStore {
    pub fn new(store: Arc<dyn KeyValueStore>, debounce: Duration) -> Self {
        let writer = Debouncer::spawn(store.clone(), debounce);
        Self {
            backend: Some(Backend { store, writer }),
        }
    }

    /// A store with no backing storage. Every operation is a no-op.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Schedule a write of `snapshot`; the last save within the debounce
    /// window wins.
    pub fn save(&self, lesson_id: &str, snapshot: &PersistedSnapshot) {
        let Some(backend) = &self.backend else {
            return;
        };

        let stamped = PersistedSnapshot {
            updated_at: Some(Utc::now()),
            ..snapshot.clone()
        };
        match serde_json::to_string(&stamped) {
            Ok(json) => backend.writer.write(storage_key(lesson_id), json),
            Err(e) => warn!(lesson = lesson_id, error = %e, "failed to encode snapshot"),
        }
    }

    pub fn load(&self, lesson_id: &str) -> Option<PersistedSnapshot> {
        let backend = self.backend.as_ref()?;
        // Reads must see saves that are still waiting out the window
        backend.writer.flush();

        let raw = match backend.store.get(&storage_key(lesson_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(lesson = lesson_id, error = %e, "failed to read snapshot");
                return None;
            }
        };

        match serde_json::from_str::<PersistedSnapshot>(&raw) {
            Ok(snapshot) => {
                debug!(lesson = lesson_id, cursor = snapshot.cursor, "snapshot loaded");
                Some(snapshot)
            }
            Err(e) => {
                warn!(lesson = lesson_id, error = %e, "ignoring corrupted snapshot");
                None
            }
        }
    }

    pub fn clear(&self, lesson_id: &str) {
        if let Some(backend) = &self.backend {
            backend.writer.remove(storage_key(lesson_id));
            debug!(lesson = lesson_id, "snapshot cleared");
        }
    }

    pub fn flush(&self) {
        if let Some(backend) = &self.backend {
            backend.writer.flush();
        }
    }
}
