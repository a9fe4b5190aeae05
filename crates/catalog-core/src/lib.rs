//! catalog-core: asset catalog sync and hierarchical query engine
//!
//! This crate keeps a tree of typed data-platform assets (workspaces,
//! folders, connections, pipelines, ...) for a browser shell:
//!
//! - **Hierarchy**: flat records to a rooted forest and back, cycle and orphan safe
//! - **Query**: ancestor-preserving filters and the all/recent/favorites views
//! - **Local store**: JSON snapshot of the tree and the pending queue over a key/value store
//! - **Sync**: load/merge against an unreliable remote, offline queue, FIFO replay
//! - **Catalog**: the facade tying these together behind optimistic mutations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Catalog                             │
//! ├───────────────┬──────────────┬───────────────┬───────────────┤
//! │  hierarchy    │  query       │  local_store  │  sync         │
//! │               │              │  (KeyValue-   │  (Remote-     │
//! │               │              │   Store)      │   Catalog)    │
//! └───────────────┴──────────────┴───────────────┴───────────────┘
//! ```
//!
//! Storage and remote backends are injected through [`CatalogBuilder`]. The
//! in-memory backends are always available; `sqlite` adds SQLite-backed ones
//! and `http` a PostgREST-style remote.

pub mod asset;
pub mod catalog;
pub mod config;
pub mod defaults;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod local_store;
pub mod logging;
pub mod memory_kv;
pub mod memory_remote;
pub mod operation;
pub mod query;
pub mod rows;
pub mod store;
pub mod sync;

#[cfg(feature = "sqlite")]
pub mod sqlite_kv;
#[cfg(feature = "sqlite")]
pub mod sqlite_remote;

#[cfg(feature = "http")]
pub mod rest_remote;

pub use asset::*;
pub use catalog::{Catalog, CatalogBuilder};
pub use config::CatalogConfig;
pub use error::{CatalogError, ConfigError, RemoteError, Result, StorageError};
pub use event::CatalogEvent;
pub use local_store::LocalStore;
pub use memory_kv::MemoryKeyValueStore;
pub use memory_remote::MemoryRemoteCatalog;
pub use operation::{PendingOperation, PendingQueue};
pub use query::{CatalogView, FilterState};
pub use store::{KeyValueStore, RemoteCatalog};
pub use sync::{SyncState, SyncStatus};

#[cfg(feature = "sqlite")]
pub use sqlite_kv::SqliteKeyValueStore;
#[cfg(feature = "sqlite")]
pub use sqlite_remote::SqliteRemoteCatalog;

#[cfg(feature = "http")]
pub use rest_remote::RestRemoteCatalog;
