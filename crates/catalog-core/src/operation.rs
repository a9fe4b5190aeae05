use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::asset::{Asset, AssetId};

/// A mutation that has not been confirmed by the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "lowercase")]
pub enum PendingOperation {
    Add(Asset),
    Update(Asset),
    Delete(AssetId),
}

impl PendingOperation {
    /// Id of the asset this operation touches.
    pub fn target_id(&self) -> &str {
        match self {
            PendingOperation::Add(asset) | PendingOperation::Update(asset) => &asset.id,
            PendingOperation::Delete(id) => id,
        }
    }

    /// Add/Update carry a full snapshot; Delete only an id.
    pub fn snapshot(&self) -> Option<&Asset> {
        match self {
            PendingOperation::Add(asset) | PendingOperation::Update(asset) => Some(asset),
            PendingOperation::Delete(_) => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, PendingOperation::Delete(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingOperation::Add(_) => "add",
            PendingOperation::Update(_) => "update",
            PendingOperation::Delete(_) => "delete",
        }
    }
}

/// FIFO queue of pending operations, persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    ops: VecDeque<PendingOperation>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: PendingOperation) {
        self.ops.push_back(op);
    }

    pub fn pop_front(&mut self) -> Option<PendingOperation> {
        self.ops.pop_front()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.ops.iter()
    }

    /// Take every queued operation, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<PendingOperation> {
        self.ops.drain(..).collect()
    }

    /// Put operations back at the front, ahead of anything queued since
    /// they were drained, keeping their relative order.
    pub fn requeue_front(&mut self, ops: Vec<PendingOperation>) {
        for op in ops.into_iter().rev() {
            self.ops.push_front(op);
        }
    }

    /// Drop queued Add/Update operations for assets that have since been
    /// deleted, so replay cannot resurrect them.
    pub fn supersede_deleted(&mut self, deleted: &HashSet<AssetId>) -> usize {
        let before = self.ops.len();
        self.ops
            .retain(|op| op.is_delete() || !deleted.contains(op.target_id()));
        before - self.ops.len()
    }
}

impl FromIterator<PendingOperation> for PendingQueue {
    fn from_iter<I: IntoIterator<Item = PendingOperation>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}
