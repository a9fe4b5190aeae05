//! Conversion between flat asset lists and the rooted forest, plus the
//! iterative tree walks the catalog uses to read and edit that forest.

use std::collections::{HashMap, HashSet};

use crate::asset::{Asset, AssetId, AssetType};

/// Build a rooted forest from a flat list of assets.
///
/// Each record is attached under its parent when the parent id is present in
/// the input; otherwise it becomes a root. Records whose parent chain loops
/// back on itself are cut at the first member of the loop encountered, which
/// becomes a root. Sibling order follows input order. Any `children` already
/// materialized on the input are flattened in first.
pub fn build_hierarchy(assets: Vec<Asset>) -> Vec<Asset> {
    let flat = flatten_owned(assets);

    let mut nodes: Vec<Option<Asset>> = Vec::with_capacity(flat.len());
    let mut index: HashMap<AssetId, usize> = HashMap::with_capacity(flat.len());
    for asset in flat {
        if index.contains_key(&asset.id) {
            tracing::warn!(id = %asset.id, "dropping duplicate asset id");
            continue;
        }
        index.insert(asset.id.clone(), nodes.len());
        nodes.push(Some(asset));
    }

    let mut parent_of: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            node.as_ref()
                .and_then(|a| a.parent_id.as_ref())
                .and_then(|pid| index.get(pid).copied())
                .filter(|&p| p != i)
        })
        .collect();

    break_cycles(&mut parent_of);

    let mut child_lists: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(p) => child_lists[*p].push(i),
            None => roots.push(i),
        }
    }

    // Pre-order over the index graph; building in reverse guarantees every
    // child is finished before its parent takes it.
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        order.push(i);
        stack.extend(child_lists[i].iter().rev().copied());
    }

    let mut built: Vec<Option<Asset>> = vec![None; nodes.len()];
    for &i in order.iter().rev() {
        let Some(mut asset) = nodes[i].take() else {
            continue;
        };
        asset.children = child_lists[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        built[i] = Some(asset);
    }

    roots.into_iter().filter_map(|r| built[r].take()).collect()
}

/// Cut parent links so the parent graph is acyclic.
fn break_cycles(parent_of: &mut [Option<usize>]) {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parent_of.len()];
    for start in 0..parent_of.len() {
        if state[start] != UNSEEN {
            continue;
        }
        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            match state[i] {
                DONE => break,
                ON_PATH => {
                    tracing::warn!(index = i, "parent cycle detected, promoting to root");
                    parent_of[i] = None;
                    break;
                }
                _ => {
                    state[i] = ON_PATH;
                    path.push(i);
                    current = parent_of[i];
                }
            }
        }
        for i in path {
            state[i] = DONE;
        }
    }
}

/// Pre-order flattening of a forest. The returned records carry no children.
pub fn flatten(roots: &[Asset]) -> Vec<Asset> {
    let mut out = Vec::new();
    let mut stack: Vec<&Asset> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node.without_children());
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Owning variant of [`flatten`]; avoids cloning when the forest is consumed.
pub fn flatten_owned(roots: Vec<Asset>) -> Vec<Asset> {
    let mut out = Vec::new();
    let mut stack: Vec<Asset> = roots.into_iter().rev().collect();
    while let Some(mut node) = stack.pop() {
        let children = std::mem::take(&mut node.children);
        out.push(node);
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Depth-first search; returns the first asset with this id.
pub fn find<'a>(roots: &'a [Asset], id: &str) -> Option<&'a Asset> {
    let mut stack: Vec<&Asset> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter().rev());
    }
    None
}

/// Mutable depth-first search.
pub fn find_mut<'a>(roots: &'a mut [Asset], id: &str) -> Option<&'a mut Asset> {
    let mut stack: Vec<&mut Asset> = roots.iter_mut().rev().collect();
    while let Some(node) = stack.pop() {
        if node.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter_mut().rev());
    }
    None
}

pub fn contains(roots: &[Asset], id: &str) -> bool {
    find(roots, id).is_some()
}

/// Total number of assets in the forest.
pub fn count(roots: &[Asset]) -> usize {
    let mut total = 0;
    let mut stack: Vec<&Asset> = roots.iter().collect();
    while let Some(node) = stack.pop() {
        total += 1;
        stack.extend(node.children.iter());
    }
    total
}

/// All assets of a type, in depth-first order, as flat records.
pub fn collect_by_type(roots: &[Asset], asset_type: AssetType) -> Vec<Asset> {
    let mut out = Vec::new();
    let mut stack: Vec<&Asset> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.asset_type == asset_type {
            out.push(node.without_children());
        }
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Ids of `asset` and everything below it, parents before children.
pub fn subtree_ids(asset: &Asset) -> Vec<AssetId> {
    let mut out = Vec::new();
    let mut stack: Vec<&Asset> = vec![asset];
    while let Some(node) = stack.pop() {
        out.push(node.id.clone());
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Ids of every asset under `id` (excluding `id` itself).
pub fn descendant_ids(roots: &[Asset], id: &str) -> HashSet<AssetId> {
    find(roots, id)
        .map(|node| subtree_ids(node).into_iter().skip(1).collect())
        .unwrap_or_default()
}

/// Remove the asset with this id, together with its subtree, from wherever
/// it sits in the forest.
pub fn detach(roots: &mut Vec<Asset>, id: &str) -> Option<Asset> {
    let mut stack: Vec<&mut Vec<Asset>> = vec![roots];
    while let Some(list) = stack.pop() {
        if let Some(pos) = list.iter().position(|a| a.id == id) {
            return Some(list.remove(pos));
        }
        for node in list.iter_mut() {
            stack.push(&mut node.children);
        }
    }
    None
}

/// Insert `asset` under its declared parent, or as a root when the parent is
/// not in the forest.
pub fn attach(roots: &mut Vec<Asset>, asset: Asset) {
    let parent = asset
        .parent_id
        .as_deref()
        .and_then(|pid| find_mut(roots, pid));
    match parent {
        Some(parent) => parent.children.push(asset),
        None => roots.push(asset),
    }
}

/// Re-home roots that name `parent_id` as their parent, now that it is in
/// the forest.
///
/// Only the roots are inspected, so an insert stays linear. A root whose own
/// subtree contains `parent_id` stays a root.
pub fn adopt_orphans(roots: &mut Vec<Asset>, parent_id: &str) {
    let is_orphan = |a: &Asset| a.id != parent_id && a.parent_id.as_deref() == Some(parent_id);
    if !roots.iter().any(is_orphan) {
        return;
    }
    let (orphans, kept): (Vec<Asset>, Vec<Asset>) =
        std::mem::take(roots).into_iter().partition(is_orphan);
    *roots = kept;

    let (cyclic, orphans): (Vec<Asset>, Vec<Asset>) = orphans
        .into_iter()
        .partition(|o| find(std::slice::from_ref(o), parent_id).is_some());
    roots.extend(cyclic);
    match find_mut(roots, parent_id) {
        Some(parent) => parent.children.extend(orphans),
        None => roots.extend(orphans),
    }
}
