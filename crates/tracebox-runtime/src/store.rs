use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracebox_engine::restore_trace;
use tracebox_types::{StoredTrace, StoredTraces, TraceEvent};

use crate::Result;

/// Notification sent after every store mutation.
#[derive(Debug, Clone)]
pub enum StoreChange {
    Appended(Arc<TraceEvent>),
    Cleared,
    Reloaded { count: usize },
}

/// Where stored traces live between sessions.
pub trait TracePersistence: Send + Sync {
    fn save(&self, traces: &StoredTraces) -> Result<()>;

    /// Missing storage loads as an empty list.
    fn load(&self) -> Result<StoredTraces>;
}

/// Stores traces as one pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TracePersistence for JsonFilePersistence {
    fn save(&self, traces: &StoredTraces) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write next to the target, then rename over it.
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(traces)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<StoredTraces> {
        if !self.path.exists() {
            return Ok(StoredTraces::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Ordered, append-only list of captured traces.
pub struct EventStore {
    traces: RwLock<Vec<Arc<TraceEvent>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            traces: RwLock::new(Vec::new()),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn append(&self, trace: Arc<TraceEvent>) {
        self.traces.write().push(Arc::clone(&trace));
        self.notify(StoreChange::Appended(trace));
    }

    pub fn clear(&self) {
        self.traces.write().clear();
        self.notify(StoreChange::Cleared);
    }

    pub fn snapshot(&self) -> Vec<Arc<TraceEvent>> {
        self.traces.read().clone()
    }

    pub fn len(&self) -> usize {
        self.traces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.read().is_empty()
    }

    pub fn to_stored(&self) -> StoredTraces {
        StoredTraces {
            traces: self
                .traces
                .read()
                .iter()
                .map(|trace| StoredTrace::from(trace.as_ref()))
                .collect(),
        }
    }

    /// Replace the contents with restored traces, skipping records that no
    /// longer parse. Returns how many traces were loaded.
    pub fn load_stored(&self, stored: &StoredTraces) -> usize {
        let restored: Vec<_> = stored
            .traces
            .iter()
            .filter_map(restore_trace)
            .map(Arc::new)
            .collect();
        let skipped = stored.traces.len() - restored.len();
        if skipped > 0 {
            tracing::warn!(skipped, "Some stored traces could not be restored");
        }

        let count = restored.len();
        *self.traces.write() = restored;
        self.notify(StoreChange::Reloaded { count });
        count
    }

    pub fn save(&self, persistence: &dyn TracePersistence) -> Result<()> {
        persistence.save(&self.to_stored())
    }

    pub fn load(&self, persistence: &dyn TracePersistence) -> Result<usize> {
        let stored = persistence.load()?;
        Ok(self.load_stored(&stored))
    }

    fn notify(&self, change: StoreChange) {
        // Nobody listening is fine.
        let _ = self.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use tracebox_types::{ChannelTag, ExceptionHeader};

    fn trace(text: &str) -> Arc<TraceEvent> {
        Arc::new(TraceEvent::new(
            ExceptionHeader::new(text, text, None),
            Vec::new(),
            ChannelTag::stderr(),
            Utc::now(),
        ))
    }

    #[test]
    fn test_mutations_are_broadcast() {
        let store = EventStore::new();
        let mut changes = store.subscribe();

        store.append(trace("a.FooException"));
        store.clear();

        assert!(matches!(changes.try_recv(), Ok(StoreChange::Appended(t)) if t.header.text == "a.FooException"));
        assert!(matches!(changes.try_recv(), Ok(StoreChange::Cleared)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_stored_skips_unparseable_records() {
        let store = EventStore::new();
        store.append(trace("old.StaleException"));

        let stored = StoredTraces {
            traces: vec![
                StoredTrace {
                    first_line: "a.FooException: x".to_string(),
                    other_lines: vec!["at a.B.c(B.java:1)".to_string()],
                    channel: "stderr".to_string(),
                    time: 0,
                    metadata: Default::default(),
                },
                StoredTrace {
                    first_line: "not a header".to_string(),
                    other_lines: Vec::new(),
                    channel: "stdout".to_string(),
                    time: 0,
                    metadata: Default::default(),
                },
            ],
        };

        assert_eq!(store.load_stored(&stored), 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].header.qualified_name, "a.FooException");
    }

    #[test]
    fn test_json_file_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let persistence = JsonFilePersistence::new(temp_dir.path().join("store").join("traces.json"));

        let empty = EventStore::new();
        assert_eq!(empty.load(&persistence)?, 0);

        let store = EventStore::new();
        store.append(trace("a.FooException"));
        store.append(trace("b.BarException"));
        store.save(&persistence)?;
        assert!(persistence.path().exists());
        assert!(!persistence.path().with_extension("json.tmp").exists());

        let reloaded = EventStore::new();
        assert_eq!(reloaded.load(&persistence)?, 2);
        assert_eq!(reloaded.to_stored(), store.to_stored());
        Ok(())
    }
}
