//! Catalog over the SQLite local store and SQLite remote

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use catalog_core::{
    AssetDraft, AssetType, Catalog, ConnectionMetadata, ConnectionType, AssetMetadata,
    RemoteCatalog, SqliteKeyValueStore, SqliteRemoteCatalog, SyncState,
};
use common::fixtures::remote_assets;

async fn seeded_remote(path: &std::path::Path) -> Arc<SqliteRemoteCatalog> {
    let remote = SqliteRemoteCatalog::open(path).unwrap();
    for asset in remote_assets() {
        remote.upsert(&asset).await.unwrap();
    }
    Arc::new(remote)
}

#[tokio::test]
async fn test_load_from_sqlite_remote() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seeded_remote(&dir.path().join("remote.db")).await;
    let kv = Arc::new(SqliteKeyValueStore::open(&dir.path().join("local.db")).unwrap());

    let catalog = Catalog::builder()
        .storage(kv)
        .remote(remote)
        .build()
        .unwrap();
    let status = catalog.load().await;

    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(catalog.len(), 7);
    let conn = catalog.get("conn-warehouse").unwrap();
    assert_eq!(
        conn.connection_metadata().unwrap().connection_type,
        ConnectionType::DataWarehouse
    );
}

#[tokio::test]
async fn test_writes_round_trip_through_both_databases() {
    let dir = tempfile::tempdir().unwrap();
    let remote_path = dir.path().join("remote.db");
    let local_path = dir.path().join("local.db");
    let remote = seeded_remote(&remote_path).await;

    let mut meta = ConnectionMetadata::new(ConnectionType::Database);
    meta.host = Some("db.internal".into());
    meta.port = Some(5432);
    let draft = AssetDraft::new("Orders Postgres", AssetType::Connection)
        .with_id("conn-orders")
        .with_parent("ws-sales")
        .with_metadata(AssetMetadata::Connection(meta))
        .with_tags(["prod"]);

    {
        let catalog = Catalog::builder()
            .storage(Arc::new(SqliteKeyValueStore::open(&local_path).unwrap()))
            .remote(remote.clone())
            .build()
            .unwrap();
        catalog.load().await;
        catalog.add(draft).unwrap();
        catalog.delete("app-forecast").unwrap();
        catalog.flush().await;
        assert!(catalog.pending_operations().is_empty());
    }

    let reopened = SqliteRemoteCatalog::open(&remote_path).unwrap();
    let rows = reopened.fetch_all().await.unwrap();
    let added = rows.iter().find(|a| a.id == "conn-orders").unwrap();
    assert_eq!(added.connection_metadata().unwrap().port, Some(5432));
    assert_eq!(added.owner.as_deref(), Some("Catalog Admin"));
    assert!(rows.iter().all(|a| a.id != "app-forecast"));

    // Local database alone is enough for an offline session.
    let offline = Catalog::builder()
        .storage(Arc::new(SqliteKeyValueStore::open(&local_path).unwrap()))
        .build()
        .unwrap();
    assert!(offline.get("conn-orders").is_some());
    assert!(offline.get("app-forecast").is_none());
}
