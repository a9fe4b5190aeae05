use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::asset::{Asset, AssetId};
use crate::error::RemoteError;
use crate::store::RemoteCatalog;

/// In-process remote catalog.
///
/// Stands in for the backend in tests and offline demos. Clones share state,
/// and reachability can be toggled to exercise fallback and replay.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteCatalog {
    rows: Arc<Mutex<Vec<Asset>>>,
    unreachable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MemoryRemoteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote pre-populated with these assets (flattened, in order).
    pub fn with_assets(assets: Vec<Asset>) -> Self {
        let remote = Self::new();
        if let Ok(mut rows) = remote.rows.lock() {
            *rows = crate::hierarchy::flatten_owned(assets);
        }
        remote
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Number of calls attempted, reachable or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Current rows, in insertion order.
    pub fn snapshot(&self) -> Vec<Asset> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().iter().any(|a| a.id == id)
    }

    /// Replace a row directly, bypassing reachability (simulates another
    /// client writing to the backend).
    pub fn put(&self, asset: Asset) {
        if let Ok(mut rows) = self.rows.lock() {
            upsert_row(&mut rows, asset);
        }
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, Vec<Asset>>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("connection refused".into()));
        }
        self.rows
            .lock()
            .map_err(|e| RemoteError::Unreachable(e.to_string()))
    }
}

fn upsert_row(rows: &mut Vec<Asset>, asset: Asset) {
    let asset = asset.without_children();
    match rows.iter_mut().find(|r| r.id == asset.id) {
        Some(existing) => *existing = asset,
        None => rows.push(asset),
    }
}

#[async_trait]
impl RemoteCatalog for MemoryRemoteCatalog {
    async fn fetch_all(&self) -> Result<Vec<Asset>, RemoteError> {
        let rows = self.enter()?;
        Ok(rows.clone())
    }

    async fn upsert(&self, asset: &Asset) -> Result<(), RemoteError> {
        let mut rows = self.enter()?;
        upsert_row(&mut rows, asset.clone());
        Ok(())
    }

    async fn delete(&self, id: &AssetId) -> Result<(), RemoteError> {
        let mut rows = self.enter()?;
        let before = rows.len();
        rows.retain(|r| &r.id != id);
        if rows.len() == before {
            return Err(RemoteError::NotFound(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;

    #[tokio::test]
    async fn upsert_fetch_delete() {
        let remote = MemoryRemoteCatalog::new();
        let asset = Asset::new("a1", "Test", AssetType::Connection);
        remote.upsert(&asset).await.unwrap();
        remote.upsert(&asset).await.unwrap();
        assert_eq!(remote.fetch_all().await.unwrap().len(), 1);
        remote.delete(&"a1".to_string()).await.unwrap();
        let err = remote.delete(&"a1".to_string()).await.unwrap_err();
        assert_eq!(err, RemoteError::NotFound("a1".into()));
    }

    #[tokio::test]
    async fn unreachable_fails_and_counts() {
        let remote = MemoryRemoteCatalog::new();
        remote.set_reachable(false);
        assert!(matches!(
            remote.fetch_all().await,
            Err(RemoteError::Unreachable(_))
        ));
        assert_eq!(remote.call_count(), 1);
    }

    #[test]
    fn seeded_rows_are_flat() {
        let mut ws = Asset::new("ws1", "Workspace", AssetType::Workspace);
        ws.children
            .push(Asset::new("f1", "Folder", AssetType::Folder).with_parent("ws1"));
        let remote = MemoryRemoteCatalog::with_assets(vec![ws]);
        let rows = remote.snapshot();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.children.is_empty()));
        assert!(remote.contains("f1"));
    }
}
