//! Test fixture loading and catalog construction helpers

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::{
    Asset, AssetId, AssetType, Catalog, MemoryKeyValueStore, MemoryRemoteCatalog, RemoteCatalog,
    RemoteError,
};
use tokio::sync::Notify;

/// Get the path to a fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

/// Load a fixture file as a string
pub fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

/// The flat asset list served by the fixture remote
pub fn remote_assets() -> Vec<Asset> {
    serde_json::from_str(&load_fixture("remote_catalog.json")).expect("valid fixture json")
}

/// A remote pre-populated with the fixture catalog
pub fn fixture_remote() -> MemoryRemoteCatalog {
    MemoryRemoteCatalog::with_assets(remote_assets())
}

/// Catalog with no remote at all
pub fn offline_catalog(kv: &MemoryKeyValueStore) -> Catalog {
    Catalog::builder()
        .storage(Arc::new(kv.clone()))
        .build()
        .expect("offline catalog")
}

/// Catalog wired to `remote`. Must be called inside a Tokio runtime.
pub fn remote_catalog(kv: &MemoryKeyValueStore, remote: &MemoryRemoteCatalog) -> Catalog {
    Catalog::builder()
        .storage(Arc::new(kv.clone()))
        .remote(Arc::new(remote.clone()))
        .build()
        .expect("catalog with remote")
}

/// Catalog wired to any remote. Must be called inside a Tokio runtime.
pub fn catalog_with_remote(kv: &MemoryKeyValueStore, remote: Arc<dyn RemoteCatalog>) -> Catalog {
    Catalog::builder()
        .storage(Arc::new(kv.clone()))
        .remote(remote)
        .build()
        .expect("catalog with remote")
}

/// Remote whose `fetch_all` parks until [`GatedRemote::open`], so a test can
/// mutate the catalog while a load is waiting on the network.
#[derive(Clone)]
pub struct GatedRemote {
    pub rows: MemoryRemoteCatalog,
    fetching: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedRemote {
    pub fn new(rows: MemoryRemoteCatalog) -> Self {
        Self {
            rows,
            fetching: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Wait until a fetch is parked at the gate.
    pub async fn fetch_started(&self) {
        self.fetching.notified().await;
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl RemoteCatalog for GatedRemote {
    async fn fetch_all(&self) -> Result<Vec<Asset>, RemoteError> {
        self.fetching.notify_one();
        self.gate.notified().await;
        self.rows.fetch_all().await
    }

    async fn upsert(&self, asset: &Asset) -> Result<(), RemoteError> {
        self.rows.upsert(asset).await
    }

    async fn delete(&self, id: &AssetId) -> Result<(), RemoteError> {
        self.rows.delete(id).await
    }
}

/// A flat chain of `depth` folders under `root`. The innermost folder is
/// named "bottom", the rest "nested".
pub fn deep_chain(root: &str, depth: usize) -> Vec<Asset> {
    let mut flat = Vec::with_capacity(depth + 1);
    flat.push(Asset::new(root, "Deep workspace", AssetType::Workspace));
    for i in 0..depth {
        let parent = if i == 0 {
            root.to_string()
        } else {
            format!("{}-{}", root, i - 1)
        };
        let name = if i + 1 == depth { "bottom" } else { "nested" };
        flat.push(
            Asset::new(format!("{}-{}", root, i), name, AssetType::Folder).with_parent(parent),
        );
    }
    flat
}

pub fn ids(assets: &[Asset]) -> Vec<&str> {
    assets.iter().map(|a| a.id.as_str()).collect()
}
