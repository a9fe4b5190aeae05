//! The catalog facade: one in-memory forest kept durable locally and
//! reconciled against an optional remote.
//!
//! Mutations are synchronous and never fail because of the network. They
//! apply to the tree, persist it, and hand the remote write to a background
//! writer task. The writer and [`Catalog::load`] share one async lane, so the
//! remote never sees two calls at once and queued operations replay in the
//! order they were made.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::asset::{validate_asset, Asset, AssetDraft, AssetId, AssetPatch, AssetType};
use crate::config::CatalogConfig;
use crate::defaults::default_assets;
use crate::error::{CatalogError, RemoteError, Result};
use crate::event::CatalogEvent;
use crate::hierarchy::{self, build_hierarchy, flatten};
use crate::local_store::LocalStore;
use crate::memory_kv::MemoryKeyValueStore;
use crate::operation::{PendingOperation, PendingQueue};
use crate::query::{self, FilterState};
use crate::store::{KeyValueStore, RemoteCatalog};
use crate::sync::{self, SyncState, SyncStatus, UnsentChanges};

const EVENT_CAPACITY: usize = 256;

/// Builder for [`Catalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    config: CatalogConfig,
    kv: Option<Arc<dyn KeyValueStore>>,
    remote: Option<Arc<dyn RemoteCatalog>>,
}

impl CatalogBuilder {
    pub fn config(mut self, config: CatalogConfig) -> Self {
        self.config = config;
        self
    }

    /// Local key/value store. Defaults to a fresh in-memory store.
    pub fn storage(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Remote catalog. Without one (and without `remote.base_url` in the
    /// config when built with the `http` feature) the catalog runs offline.
    pub fn remote(mut self, remote: Arc<dyn RemoteCatalog>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Build the catalog and seed the tree from local storage, or the
    /// built-in defaults when nothing usable is stored.
    ///
    /// A remote requires a running Tokio runtime for the background writer.
    pub fn build(self) -> Result<Catalog> {
        self.config
            .validate()
            .map_err(|e| CatalogError::Validation(e.to_string()))?;

        let remote = match self.remote {
            Some(remote) => Some(remote),
            None => configured_remote(&self.config)?,
        };

        let kv = self
            .kv
            .unwrap_or_else(|| Arc::new(MemoryKeyValueStore::new()));
        let local = LocalStore::new(kv, &self.config.storage.key_prefix);

        let roots = match local.load() {
            Some(flat) => build_hierarchy(flat),
            None => {
                tracing::info!("no stored catalog, seeding built-in defaults");
                default_assets()
            }
        };
        let pending = local.load_pending();
        let mut status = SyncStatus::new(if remote.is_some() {
            SyncState::Loading
        } else {
            SyncState::Unconfigured
        });
        status.pending = pending.len();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let (writer, writer_rx) = if remote.is_some() {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| CatalogError::Runtime(e.to_string()))?;
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some((handle, rx)))
        } else {
            (None, None)
        };

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                roots,
                pending,
                in_flight: HashMap::new(),
                changed: false,
                status,
            }),
            local,
            remote,
            config: self.config,
            lane: tokio::sync::Mutex::new(()),
            writer,
            events,
        });

        if let Some((handle, rx)) = writer_rx {
            handle.spawn(run_writer(Arc::downgrade(&inner), rx));
        }

        Ok(Catalog { inner })
    }
}

#[cfg(feature = "http")]
fn configured_remote(config: &CatalogConfig) -> Result<Option<Arc<dyn RemoteCatalog>>> {
    if !config.remote.is_configured() {
        return Ok(None);
    }
    let remote = crate::rest_remote::RestRemoteCatalog::from_config(&config.remote)
        .map_err(|e| CatalogError::Validation(e.to_string()))?;
    Ok(Some(Arc::new(remote)))
}

#[cfg(not(feature = "http"))]
fn configured_remote(config: &CatalogConfig) -> Result<Option<Arc<dyn RemoteCatalog>>> {
    if config.remote.is_configured() {
        tracing::warn!("remote.base_url is set but the http feature is disabled, running offline");
    }
    Ok(None)
}

/// Asset catalog service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    local: LocalStore,
    remote: Option<Arc<dyn RemoteCatalog>>,
    config: CatalogConfig,
    /// Serializes every remote call.
    lane: tokio::sync::Mutex<()>,
    writer: Option<mpsc::UnboundedSender<WriterCommand>>,
    events: broadcast::Sender<CatalogEvent>,
}

struct State {
    roots: Vec<Asset>,
    pending: PendingQueue,
    /// Writes handed to the writer task that are neither sent nor queued.
    in_flight: HashMap<AssetId, InFlight>,
    /// Set by the first mutation or merge. From then on the tree, not local
    /// storage, is the session's source of truth.
    changed: bool,
    status: SyncStatus,
}

#[derive(Default)]
struct InFlight {
    ops: usize,
    deleted: bool,
}

impl State {
    /// Everything the remote has not confirmed yet. Queued ops are older
    /// than in-flight ones, so they are recorded first.
    fn unsent(&self) -> UnsentChanges {
        let mut unsent = UnsentChanges::from_queue(&self.pending);
        for (id, flight) in &self.in_flight {
            unsent.record(id, flight.deleted);
        }
        unsent
    }
}

enum WriterCommand {
    Write(PendingOperation),
    Flush(oneshot::Sender<()>),
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    // ===== Sync =====

    /// Load from the remote, falling back to local or built-in data.
    ///
    /// On success the fetched records are merged with the local view,
    /// persisted, and any queued operations are replayed once. Never fails;
    /// the outcome is reported through the returned status.
    pub async fn load(&self) -> SyncStatus {
        let inner = &self.inner;
        let _lane = inner.lane.lock().await;

        let Some(remote) = inner.remote.clone() else {
            inner.enter_fallback(&RemoteError::Unconfigured);
            return self.status();
        };

        inner.set_state(SyncState::Loading);

        let fetched = match remote.fetch_all().await {
            Ok(fetched) => fetched,
            Err(e) => {
                inner.enter_fallback(&e);
                return self.status();
            }
        };

        let ops = {
            let mut state = inner.lock();
            let local = flatten(&state.roots);
            let merged = sync::merge(fetched, &local, &state.unsent());
            state.roots = build_hierarchy(merged);
            state.changed = true;
            state.status.state = SyncState::Synced;
            state.status.using_fallback = false;
            state.status.last_error = None;
            state.status.last_synced = Some(Utc::now());
            inner.local.save(&state.roots);
            inner.emit(CatalogEvent::Loaded {
                count: hierarchy::count(&state.roots),
            });

            if state.pending.is_empty() {
                inner.emit(CatalogEvent::StatusChanged(state.status.clone()));
                return state.status.clone();
            }
            state.status.state = SyncState::Reconciling;
            inner.emit(CatalogEvent::StatusChanged(state.status.clone()));
            state.pending.drain()
        };

        tracing::info!(ops = ops.len(), "replaying pending operations");
        let (remaining, report) = sync::replay(remote.as_ref(), ops).await;

        let mut state = inner.lock();
        state.pending.requeue_front(remaining);
        inner.local.save_pending(&state.pending);
        state.status.state = SyncState::Synced;
        state.status.pending = state.pending.len();
        if let Some(e) = report.last_error {
            state.status.last_error = Some(format!(
                "{} change(s) could not be sent and will be retried: {}",
                state.status.pending, e
            ));
        }
        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            deferred = report.deferred,
            "reconciliation finished"
        );
        inner.emit(CatalogEvent::PendingChanged {
            pending: state.status.pending,
        });
        inner.emit(CatalogEvent::StatusChanged(state.status.clone()));
        state.status.clone()
    }

    /// Manual retry: runs a full [`load`](Self::load).
    pub async fn retry(&self) -> SyncStatus {
        self.load().await
    }

    /// Wait until every remote write dispatched so far has been attempted.
    pub async fn flush(&self) {
        let Some(writer) = &self.inner.writer else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writer.send(WriterCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.lock().status.clone()
    }

    pub fn is_using_fallback(&self) -> bool {
        self.inner.lock().status.using_fallback
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().status.last_error.clone()
    }

    /// Clear the error banner. The fallback flag stays until a load succeeds.
    pub fn dismiss_error(&self) {
        let mut state = self.inner.lock();
        if state.status.last_error.take().is_some() {
            self.inner
                .emit(CatalogEvent::StatusChanged(state.status.clone()));
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.inner.events.subscribe()
    }

    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    // ===== Mutations =====

    /// Add an asset. Owner, quality and modified time get defaults; the id is
    /// generated when the draft has none.
    pub fn add(&self, draft: AssetDraft) -> Result<Asset> {
        draft.validate()?;
        let inner = &self.inner;
        let defaults = &inner.config.defaults;

        let (asset, op) = {
            let mut state = inner.lock();
            let id = draft
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if hierarchy::contains(&state.roots, &id) {
                return Err(CatalogError::AlreadyExists(id));
            }
            let asset = draft.into_asset(id, &defaults.owner, defaults.quality, Utc::now());
            validate_asset(&asset)?;

            hierarchy::attach(&mut state.roots, asset.clone());
            hierarchy::adopt_orphans(&mut state.roots, &asset.id);
            inner.local.save(&state.roots);
            let op = PendingOperation::Add(asset.clone());
            inner.stage(&mut state, std::slice::from_ref(&op));
            (asset, op)
        };

        tracing::debug!(id = %asset.id, asset_type = %asset.asset_type, "asset added");
        inner.emit(CatalogEvent::Added(Box::new(asset.clone())));
        inner.send(op);
        Ok(asset)
    }

    /// Shallow-merge `patch` into an asset and refresh its modified time.
    ///
    /// Moving an asset under itself or one of its descendants is rejected.
    pub fn update(&self, id: &str, patch: AssetPatch) -> Result<Asset> {
        let inner = &self.inner;

        let (updated, op) = {
            let mut state = inner.lock();
            let current = hierarchy::find(&state.roots, id)
                .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

            let moves = patch.moves(current);
            if moves {
                if let Some(Some(parent)) = &patch.parent_id {
                    if !hierarchy::contains(&state.roots, parent) {
                        return Err(CatalogError::NotFound(parent.clone()));
                    }
                    if hierarchy::subtree_ids(current).contains(parent) {
                        return Err(CatalogError::InvalidOperation(format!(
                            "cannot move {} under its own subtree",
                            id
                        )));
                    }
                }
            }

            let mut updated = current.without_children();
            patch.apply_to(&mut updated);
            validate_asset(&updated)?;
            updated.touch(Utc::now());

            if moves {
                let mut node = hierarchy::detach(&mut state.roots, id)
                    .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
                let mut moved = updated.clone();
                moved.children = std::mem::take(&mut node.children);
                hierarchy::attach(&mut state.roots, moved);
            } else if let Some(node) = hierarchy::find_mut(&mut state.roots, id) {
                let children = std::mem::take(&mut node.children);
                *node = updated.clone();
                node.children = children;
            }
            inner.local.save(&state.roots);
            let op = PendingOperation::Update(updated.clone());
            inner.stage(&mut state, std::slice::from_ref(&op));
            (updated, op)
        };

        inner.emit(CatalogEvent::Updated(Box::new(updated.clone())));
        inner.send(op);
        Ok(updated)
    }

    /// Delete an asset and its whole subtree. Returns the removed ids,
    /// parents first.
    pub fn delete(&self, id: &str) -> Result<Vec<AssetId>> {
        let inner = &self.inner;

        let (removed, ops) = {
            let mut state = inner.lock();
            let node = hierarchy::detach(&mut state.roots, id)
                .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
            let removed = hierarchy::subtree_ids(&node);
            drop(node);

            let gone: HashSet<AssetId> = removed.iter().cloned().collect();
            let superseded = state.pending.supersede_deleted(&gone);
            if superseded > 0 {
                tracing::debug!(superseded, "dropped queued writes for deleted assets");
                inner.pending_changed(&mut state);
            }
            inner.local.save(&state.roots);

            // Children before parents.
            let ops: Vec<PendingOperation> = removed
                .iter()
                .rev()
                .map(|removed_id| PendingOperation::Delete(removed_id.clone()))
                .collect();
            inner.stage(&mut state, &ops);
            (removed, ops)
        };

        tracing::debug!(id, count = removed.len(), "asset subtree deleted");
        inner.emit(CatalogEvent::Deleted {
            ids: removed.clone(),
        });
        for op in ops {
            inner.send(op);
        }
        Ok(removed)
    }

    /// Flip the favorite tag. Returns whether the asset is now a favorite.
    pub fn toggle_favorite(&self, id: &str) -> Result<bool> {
        let inner = &self.inner;
        let (updated, op) = {
            let mut state = inner.lock();
            let node = hierarchy::find_mut(&mut state.roots, id)
                .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
            node.toggle_favorite();
            node.touch(Utc::now());
            let updated = node.without_children();
            inner.local.save(&state.roots);
            let op = PendingOperation::Update(updated.clone());
            inner.stage(&mut state, std::slice::from_ref(&op));
            (updated, op)
        };

        let favorite = updated.is_favorite();
        inner.emit(CatalogEvent::Updated(Box::new(updated)));
        inner.send(op);
        Ok(favorite)
    }

    /// Re-parent an asset; `None` makes it a root.
    pub fn move_asset(&self, id: &str, new_parent: Option<AssetId>) -> Result<Asset> {
        self.update(id, AssetPatch::parent(new_parent))
    }

    // ===== Reads =====

    /// Depth-first lookup, including the asset's subtree.
    pub fn get(&self, id: &str) -> Option<Asset> {
        hierarchy::find(&self.inner.lock().roots, id).cloned()
    }

    pub fn get_by_type(&self, asset_type: AssetType) -> Vec<Asset> {
        hierarchy::collect_by_type(&self.inner.lock().roots, asset_type)
    }

    pub fn connections(&self) -> Vec<Asset> {
        self.get_by_type(AssetType::Connection)
    }

    /// The whole forest.
    pub fn snapshot(&self) -> Vec<Asset> {
        self.inner.lock().roots.clone()
    }

    pub fn len(&self) -> usize {
        hierarchy::count(&self.inner.lock().roots)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().roots.is_empty()
    }

    /// Flat list view.
    pub fn query(&self, filter: &FilterState) -> Vec<Asset> {
        let recent_limit = self.inner.config.query.recent_limit;
        query::query_flat(&self.inner.lock().roots, filter, recent_limit)
    }

    /// Tree view, ancestors of every match preserved.
    pub fn query_hierarchical(&self, filter: &FilterState) -> Vec<Asset> {
        query::query_hierarchical(&self.inner.lock().roots, filter)
    }

    pub fn owners(&self) -> Vec<String> {
        query::owners(&self.inner.lock().roots)
    }

    pub fn tag_names(&self) -> Vec<String> {
        query::tag_names(&self.inner.lock().roots)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Catalog")
            .field("assets", &hierarchy::count(&state.roots))
            .field("status", &state.status)
            .field("remote", &self.inner.remote.is_some())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CatalogEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, new_state: SyncState) {
        let mut state = self.lock();
        state.status.state = new_state;
        self.emit(CatalogEvent::StatusChanged(state.status.clone()));
    }

    /// Flag the fallback. An untouched tree is re-seeded from local storage
    /// (or the defaults); once this session has changed the tree it is kept,
    /// since storage may be behind it.
    fn enter_fallback(&self, err: &RemoteError) {
        tracing::warn!(error = %err, "remote catalog unavailable, using local data");
        let mut state = self.lock();
        if !state.changed {
            if let Some(flat) = self.local.load() {
                state.roots = build_hierarchy(flat);
            } else if state.roots.is_empty() {
                state.roots = default_assets();
            }
        }
        state.status.state = SyncState::Fallback;
        state.status.using_fallback = true;
        state.status.last_error = Some(err.to_string());
        state.status.pending = state.pending.len();
        self.emit(CatalogEvent::Loaded {
            count: hierarchy::count(&state.roots),
        });
        self.emit(CatalogEvent::StatusChanged(state.status.clone()));
    }

    /// Record a mutation's remote writes. Called in the mutation's own
    /// critical section, so a concurrent load never sees the change without
    /// also seeing it as unsent. Without a remote the writes wait in the
    /// queue for the first session that has one.
    fn stage(&self, state: &mut State, ops: &[PendingOperation]) {
        state.changed = true;
        if self.writer.is_none() {
            for op in ops {
                state.pending.push(op.clone());
            }
            self.pending_changed(state);
            return;
        }
        for op in ops {
            let flight = state
                .in_flight
                .entry(op.target_id().to_string())
                .or_default();
            flight.ops += 1;
            flight.deleted = op.is_delete();
        }
    }

    /// Hand a staged write to the background writer.
    fn send(&self, op: PendingOperation) {
        let Some(writer) = &self.writer else {
            return;
        };
        if let Err(mpsc::error::SendError(WriterCommand::Write(op))) =
            writer.send(WriterCommand::Write(op))
        {
            tracing::warn!(id = op.target_id(), "remote writer stopped, queueing operation");
            self.settle(&mut self.lock(), op, false);
        }
    }

    /// Retire an in-flight write, queueing it unless it reached the remote.
    fn settle(&self, state: &mut State, op: PendingOperation, delivered: bool) {
        let done = match state.in_flight.get_mut(op.target_id()) {
            Some(flight) => {
                flight.ops = flight.ops.saturating_sub(1);
                flight.ops == 0
            }
            None => false,
        };
        if done {
            state.in_flight.remove(op.target_id());
        }
        if !delivered {
            self.push_pending(state, op);
        }
    }

    fn push_pending(&self, state: &mut State, op: PendingOperation) {
        state.pending.push(op);
        self.pending_changed(state);
    }

    fn pending_changed(&self, state: &mut State) {
        state.status.pending = state.pending.len();
        self.local.save_pending(&state.pending);
        self.emit(CatalogEvent::PendingChanged {
            pending: state.status.pending,
        });
    }

    /// Send one write, or queue it behind operations that are already
    /// waiting so replay order matches mutation order.
    async fn write_through(&self, op: PendingOperation) {
        let Some(remote) = &self.remote else {
            return;
        };
        let _lane = self.lane.lock().await;

        {
            let mut state = self.lock();
            if !state.pending.is_empty() {
                self.settle(&mut state, op, false);
                return;
            }
        }

        let result = sync::dispatch(remote.as_ref(), &op).await;
        match &result {
            Ok(()) => tracing::debug!(op = op.kind(), id = op.target_id(), "remote write ok"),
            Err(e) => {
                tracing::warn!(op = op.kind(), id = op.target_id(), error = %e, "remote write failed, queued");
            }
        }
        self.settle(&mut self.lock(), op, result.is_ok());
    }
}

async fn run_writer(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Write(op) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.write_through(op).await;
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("remote writer stopped");
}
