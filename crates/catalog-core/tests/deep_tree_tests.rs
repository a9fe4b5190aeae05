//! Facade operations over a hierarchy far deeper than the call stack allows
//! for recursive walks

mod common;

use std::sync::Arc;

use catalog_core::hierarchy;
use catalog_core::{
    AssetDraft, AssetType, Catalog, CatalogView, FilterState, KeyValueStore, MemoryKeyValueStore,
    MemoryRemoteCatalog, SyncState,
};
use common::fixtures::{deep_chain, remote_catalog};

const DEPTH: usize = 50_000;

fn deep_kv() -> MemoryKeyValueStore {
    let kv = MemoryKeyValueStore::new();
    let json = serde_json::to_string(&deep_chain("deep", DEPTH)).unwrap();
    kv.set("catalog:assets", &json).unwrap();
    kv
}

fn deep_catalog() -> Catalog {
    Catalog::builder()
        .storage(Arc::new(deep_kv()))
        .build()
        .unwrap()
}

fn bottom_id() -> String {
    format!("deep-{}", DEPTH - 1)
}

#[test]
fn test_deep_tree_reads() {
    let catalog = deep_catalog();
    assert_eq!(catalog.len(), DEPTH + 1);

    let root = catalog.get("deep").unwrap();
    assert_eq!(root.children.len(), 1);
    assert_eq!(hierarchy::count(std::slice::from_ref(&root)), DEPTH + 1);
    assert_eq!(catalog.snapshot(), catalog.snapshot());
    assert_eq!(catalog.get_by_type(AssetType::Folder).len(), DEPTH);

    let found = catalog.query_hierarchical(&FilterState::new().search("bottom"));
    assert_eq!(hierarchy::count(&found), DEPTH + 1);
    assert!(hierarchy::contains(&found, &bottom_id()));

    let recent = catalog.query_hierarchical(&FilterState::new().view(CatalogView::Recent));
    assert_eq!(hierarchy::count(&recent), DEPTH + 1);
    assert_eq!(catalog.query(&FilterState::new().search("bottom")).len(), 1);
}

#[test]
fn test_deep_tree_mutations() {
    let catalog = deep_catalog();

    let leaf = catalog
        .add(AssetDraft::new("Leaf", AssetType::Script).with_parent(bottom_id()))
        .unwrap();
    assert_eq!(catalog.get(&bottom_id()).unwrap().children[0].id, leaf.id);

    catalog.move_asset("deep-0", None).unwrap();
    assert_eq!(catalog.get("deep").unwrap().children.len(), 0);

    let removed = catalog.delete("deep-0").unwrap();
    assert_eq!(removed.len(), DEPTH + 1);
    assert_eq!(catalog.len(), 1);
    // The queued add and move were superseded; one delete per removed asset.
    assert_eq!(catalog.pending_operations().len(), DEPTH + 1);
    assert_eq!(catalog.status().pending, DEPTH + 1);
    drop(catalog);
}

#[tokio::test]
async fn test_deep_tree_load_replaces_tree() {
    let kv = deep_kv();
    let remote = MemoryRemoteCatalog::with_assets(deep_chain("deep", DEPTH));
    let catalog = remote_catalog(&kv, &remote);

    let status = catalog.load().await;
    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(catalog.len(), DEPTH + 1);
    assert!(catalog.get(&bottom_id()).is_some());
}
