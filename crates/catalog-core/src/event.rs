use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetId};
use crate::sync::SyncStatus;

/// Events emitted by the catalog when the tree or its sync status changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CatalogEvent {
    /// The whole tree was replaced by a load.
    Loaded { count: usize },
    Added(Box<Asset>),
    Updated(Box<Asset>),
    /// A delete removed these ids, parents first.
    Deleted { ids: Vec<AssetId> },
    StatusChanged(SyncStatus),
    PendingChanged { pending: usize },
}
