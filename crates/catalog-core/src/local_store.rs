use std::sync::Arc;

use crate::asset::Asset;
use crate::hierarchy::flatten;
use crate::operation::PendingQueue;
use crate::store::KeyValueStore;

/// Durable snapshot of the catalog and its pending queue.
///
/// Sits on top of a [`KeyValueStore`] under two keys, `<prefix>:assets` and
/// `<prefix>:pending`. Never fails: storage errors are logged and dropped,
/// and unreadable data is reported as absent.
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    assets_key: String,
    pending_key: String,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: &str) -> Self {
        Self {
            kv,
            assets_key: format!("{}:assets", prefix),
            pending_key: format!("{}:pending", prefix),
        }
    }

    pub fn assets_key(&self) -> &str {
        &self.assets_key
    }

    pub fn pending_key(&self) -> &str {
        &self.pending_key
    }

    /// Persist the forest in flat form.
    pub fn save(&self, roots: &[Asset]) {
        match serde_json::to_string(&flatten(roots)) {
            Ok(json) => self.write(&self.assets_key, &json),
            Err(e) => tracing::warn!(error = %e, "failed to encode assets"),
        }
    }

    /// Last saved assets, flat. `None` when nothing usable is stored.
    pub fn load(&self) -> Option<Vec<Asset>> {
        let raw = self.read(&self.assets_key)?;
        match serde_json::from_str::<Vec<Asset>>(&raw) {
            Ok(assets) => Some(assets),
            Err(e) => {
                tracing::warn!(key = %self.assets_key, error = %e, "ignoring corrupt local assets");
                None
            }
        }
    }

    pub fn save_pending(&self, queue: &PendingQueue) {
        if queue.is_empty() {
            if let Err(e) = self.kv.remove(&self.pending_key) {
                tracing::warn!(key = %self.pending_key, error = %e, "failed to clear pending queue");
            }
            return;
        }
        match serde_json::to_string(queue) {
            Ok(json) => self.write(&self.pending_key, &json),
            Err(e) => tracing::warn!(error = %e, "failed to encode pending queue"),
        }
    }

    /// Stored pending queue, empty when absent or unreadable.
    pub fn load_pending(&self) -> PendingQueue {
        let Some(raw) = self.read(&self.pending_key) else {
            return PendingQueue::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key = %self.pending_key, error = %e, "ignoring corrupt pending queue");
            PendingQueue::new()
        })
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "local storage read failed");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.kv.set(key, value) {
            tracing::warn!(key, error = %e, "local storage write failed");
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("assets_key", &self.assets_key)
            .field("pending_key", &self.pending_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;
    use crate::memory_kv::MemoryKeyValueStore;
    use crate::operation::PendingOperation;
    use chrono::{TimeZone, Utc};

    fn store() -> (MemoryKeyValueStore, LocalStore) {
        let kv = MemoryKeyValueStore::new();
        let local = LocalStore::new(Arc::new(kv.clone()), "catalog");
        (kv, local)
    }

    #[test]
    fn save_and_load_preserves_timestamps() {
        let (_, local) = store();
        let modified = Utc.with_ymd_and_hms(2025, 11, 17, 9, 30, 0).unwrap();
        let mut root = Asset::new("ws1", "Workspace", AssetType::Workspace).with_modified(modified);
        root.children
            .push(Asset::new("f1", "Folder", AssetType::Folder).with_parent("ws1"));

        local.save(&[root]);
        let loaded = local.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].modified, Some(modified));
        assert!(loaded[0].children.is_empty());
    }

    #[test]
    fn corrupt_data_reads_as_absent() {
        let (kv, local) = store();
        kv.set("catalog:assets", "{not json").unwrap();
        kv.set("catalog:pending", "[1,2,3]").unwrap();
        assert!(local.load().is_none());
        assert!(local.load_pending().is_empty());
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let (kv, local) = store();
        kv.set_available(false);
        local.save(&[Asset::new("a", "A", AssetType::Script)]);
        assert!(local.load().is_none());
        kv.set_available(true);
        assert!(local.load().is_none());
    }

    #[test]
    fn pending_queue_round_trip_and_clear() {
        let (kv, local) = store();
        let mut queue = PendingQueue::new();
        queue.push(PendingOperation::Delete("x".into()));
        local.save_pending(&queue);
        assert_eq!(local.load_pending(), queue);

        local.save_pending(&PendingQueue::new());
        assert_eq!(kv.get("catalog:pending").unwrap(), None);
    }
}
