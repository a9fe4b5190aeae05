//! Sync state machine, remote/local merge and pending-operation replay.
//!
//! The catalog drives these pieces; nothing here touches the in-memory tree
//! directly, which keeps merge and replay testable on plain values.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetId};
use crate::error::RemoteError;
use crate::operation::{PendingOperation, PendingQueue};
use crate::store::RemoteCatalog;

/// Where the catalog stands with respect to the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No remote endpoint configured. Permanent for the session.
    #[default]
    Unconfigured,
    Loading,
    Synced,
    /// Serving local or built-in data after a failed fetch.
    Fallback,
    /// Replaying queued operations against the remote.
    Reconciling,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unconfigured => "unconfigured",
            SyncState::Loading => "loading",
            SyncState::Synced => "synced",
            SyncState::Fallback => "fallback",
            SyncState::Reconciling => "reconciling",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable sync status, surfaced to the UI as a banner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    /// True while the tree came from local storage or built-in defaults.
    pub using_fallback: bool,
    pub last_error: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
    /// Number of queued operations.
    pub pending: usize,
}

impl SyncStatus {
    pub fn new(state: SyncState) -> Self {
        Self {
            state,
            using_fallback: matches!(state, SyncState::Unconfigured | SyncState::Fallback),
            ..Self::default()
        }
    }
}

/// Ids whose latest local change the remote has not confirmed yet.
///
/// Fed from the pending queue and from writes still waiting for the writer.
/// The last change recorded for an id decides whether it counts as written
/// or deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsentChanges {
    written: HashSet<AssetId>,
    deleted: HashSet<AssetId>,
}

impl UnsentChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_queue(queue: &PendingQueue) -> Self {
        let mut changes = Self::new();
        for op in queue.iter() {
            changes.record(op.target_id(), op.is_delete());
        }
        changes
    }

    pub fn record(&mut self, id: &str, deleted: bool) {
        if deleted {
            self.written.remove(id);
            self.deleted.insert(id.to_string());
        } else {
            self.deleted.remove(id);
            self.written.insert(id.to_string());
        }
    }

    pub fn is_written(&self, id: &str) -> bool {
        self.written.contains(id)
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.deleted.is_empty()
    }
}

/// Merge a fresh remote fetch with the local view.
///
/// Both inputs are flat. Rules, in order:
/// - ids with an unsent delete are dropped;
/// - ids with an unsent add or update keep the local copy;
/// - a local copy with a higher revision beats the remote record;
/// - otherwise the remote record wins, but the favorite tag follows the
///   local copy when one exists;
/// - local assets with an unsent add or update that the remote lacks are kept.
///
/// Output order is remote order followed by retained local-only assets in
/// local order.
pub fn merge(remote: Vec<Asset>, local: &[Asset], unsent: &UnsentChanges) -> Vec<Asset> {
    let local_by_id: HashMap<&str, &Asset> = local.iter().map(|a| (a.id.as_str(), a)).collect();

    let mut seen: HashSet<AssetId> = HashSet::with_capacity(remote.len());
    let mut merged = Vec::with_capacity(remote.len());

    for mut record in remote {
        record.children.clear();
        if unsent.is_deleted(&record.id) || !seen.insert(record.id.clone()) {
            continue;
        }
        match local_by_id.get(record.id.as_str()) {
            Some(local) if unsent.is_written(&record.id) => {
                merged.push(local.without_children());
            }
            Some(local) if local.revision > record.revision => {
                tracing::debug!(
                    id = %record.id,
                    local = local.revision,
                    remote = record.revision,
                    "discarding stale remote record"
                );
                merged.push(local.without_children());
            }
            Some(local) => {
                record.set_favorite(local.is_favorite());
                merged.push(record);
            }
            None => merged.push(record),
        }
    }

    for asset in local {
        if unsent.is_written(&asset.id) && seen.insert(asset.id.clone()) {
            merged.push(asset.without_children());
        }
    }

    merged
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
    /// Kept without an attempt because an earlier op on the same id failed.
    pub deferred: usize,
    pub last_error: Option<RemoteError>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.deferred == 0
    }
}

/// Send one operation to the remote.
///
/// A Delete for a record the remote no longer has counts as done.
pub async fn dispatch(remote: &dyn RemoteCatalog, op: &PendingOperation) -> Result<(), RemoteError> {
    match op {
        PendingOperation::Add(asset) | PendingOperation::Update(asset) => {
            remote.upsert(&asset.without_children()).await
        }
        PendingOperation::Delete(id) => match remote.delete(id).await {
            Err(RemoteError::NotFound(_)) => Ok(()),
            other => other,
        },
    }
}

/// Replay operations FIFO, one attempt each.
///
/// Returns the operations that must stay queued, in their original order,
/// along with a report. Once an op for some id fails, later ops for that id
/// are kept without being attempted so per-id ordering holds.
pub async fn replay(
    remote: &dyn RemoteCatalog,
    ops: Vec<PendingOperation>,
) -> (Vec<PendingOperation>, ReplayReport) {
    let mut report = ReplayReport::default();
    let mut remaining = Vec::new();
    let mut blocked: HashSet<AssetId> = HashSet::new();

    for op in ops {
        if blocked.contains(op.target_id()) {
            report.deferred += 1;
            remaining.push(op);
            continue;
        }
        match dispatch(remote, &op).await {
            Ok(()) => {
                tracing::debug!(op = op.kind(), id = op.target_id(), "replayed pending operation");
                report.replayed += 1;
            }
            Err(e) => {
                tracing::warn!(op = op.kind(), id = op.target_id(), error = %e, "replay failed, keeping operation");
                report.failed += 1;
                report.last_error = Some(e);
                blocked.insert(op.target_id().to_string());
                remaining.push(op);
            }
        }
    }

    (remaining, report)
}
