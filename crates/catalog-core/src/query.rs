//! Filter state and the query engine behind every catalog view.
//!
//! Two strategies share the same predicates:
//! - [`query_flat`] flattens the forest and filters records directly.
//! - [`query_hierarchical`] prunes the forest, keeping ancestors of every
//!   match so a nested result stays reachable from its workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::asset::{Asset, AssetType};
use crate::hierarchy::flatten;

/// Default cap on the "recent" view.
pub const RECENT_LIMIT: usize = 20;

/// Which slice of the catalog the user is looking at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogView {
    #[default]
    All,
    Recent,
    Favorites,
}

/// Transient filter selection. Never persisted, never mutates the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default)]
    pub view: CatalogView,
    /// Case-insensitive substring matched against asset names.
    #[serde(default)]
    pub search: String,
    /// Empty means every type.
    #[serde(default)]
    pub asset_types: BTreeSet<AssetType>,
    #[serde(default)]
    pub owner: Option<String>,
    /// An asset matches when it carries any of these tags. Empty means no
    /// tag filter.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, view: CatalogView) -> Self {
        self.view = view;
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = query.into();
        self
    }

    pub fn asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_types.insert(asset_type);
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Whether anything beyond the default "all" view is selected.
    pub fn is_active(&self) -> bool {
        self.view != CatalogView::All
            || !self.search.trim().is_empty()
            || !self.asset_types.is_empty()
            || self.owner.is_some()
            || !self.tags.is_empty()
    }

    /// The attribute predicates in application order. The view is handled
    /// separately because "recent" reorders instead of filtering.
    fn predicates(&self) -> Vec<Box<dyn Fn(&Asset) -> bool + '_>> {
        let mut preds: Vec<Box<dyn Fn(&Asset) -> bool + '_>> = Vec::new();

        // Blank input means no search; otherwise the text is matched as typed.
        if !self.search.trim().is_empty() {
            let needle = self.search.to_lowercase();
            preds.push(Box::new(move |a: &Asset| {
                a.name.to_lowercase().contains(&needle)
            }));
        }
        if !self.asset_types.is_empty() {
            preds.push(Box::new(|a: &Asset| self.asset_types.contains(&a.asset_type)));
        }
        if let Some(owner) = &self.owner {
            preds.push(Box::new(move |a: &Asset| a.owner.as_ref() == Some(owner)));
        }
        if !self.tags.is_empty() {
            preds.push(Box::new(|a: &Asset| a.tags.iter().any(|t| self.tags.contains(t))));
        }
        if self.view == CatalogView::Favorites {
            preds.push(Box::new(|a: &Asset| a.is_favorite()));
        }
        preds
    }
}

/// Ancestor-preserving filter.
///
/// A node is kept when it matches or when at least one descendant matches;
/// its `children` are replaced by the filtered subtree. The input is left
/// untouched.
pub fn filter_forest<F>(roots: &[Asset], predicate: F) -> Vec<Asset>
where
    F: Fn(&Asset) -> bool,
{
    // Explicit post-order walk: a frame is revisited once all its children
    // have reported their kept subtrees.
    struct Frame<'a> {
        node: &'a Asset,
        next_child: usize,
        kept: Vec<Asset>,
    }

    let mut result = Vec::new();
    for root in roots {
        let mut stack = vec![Frame {
            node: root,
            next_child: 0,
            kept: Vec::new(),
        }];
        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            if frame.next_child < node.children.len() {
                let child = &node.children[frame.next_child];
                frame.next_child += 1;
                stack.push(Frame {
                    node: child,
                    next_child: 0,
                    kept: Vec::new(),
                });
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let keep = predicate(frame.node) || !frame.kept.is_empty();
            let pruned = keep.then(|| {
                let mut asset = frame.node.without_children();
                asset.children = frame.kept;
                asset
            });
            match (stack.last_mut(), pruned) {
                (Some(parent), Some(asset)) => parent.kept.push(asset),
                (None, Some(asset)) => result.push(asset),
                _ => {}
            }
        }
    }
    result
}

/// Stable sort by `modified`, newest first; undated assets sort last.
pub fn sort_recent(assets: &mut [Asset]) {
    assets.sort_by(|a, b| match (a.modified, b.modified) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Flat list view: every predicate filters records directly.
///
/// The recent view drops undated assets and keeps the newest `recent_limit`.
pub fn query_flat(roots: &[Asset], filter: &FilterState, recent_limit: usize) -> Vec<Asset> {
    let preds = filter.predicates();
    let mut out: Vec<Asset> = flatten(roots)
        .into_iter()
        .filter(|a| preds.iter().all(|p| p(a)))
        .collect();

    if filter.view == CatalogView::Recent {
        out.retain(|a| a.modified.is_some());
        sort_recent(&mut out);
        out.truncate(recent_limit);
    }
    out
}

/// Tree view: each predicate prunes the forest in turn, preserving ancestors
/// of its matches. The recent view reorders siblings newest first at every
/// level.
pub fn query_hierarchical(roots: &[Asset], filter: &FilterState) -> Vec<Asset> {
    let mut forest = roots.to_vec();
    for pred in filter.predicates() {
        forest = filter_forest(&forest, pred);
    }
    if filter.view == CatalogView::Recent {
        sort_siblings_recent(&mut forest);
    }
    forest
}

fn sort_siblings_recent(roots: &mut Vec<Asset>) {
    let mut stack: Vec<&mut Vec<Asset>> = vec![roots];
    while let Some(list) = stack.pop() {
        sort_recent(list);
        for node in list.iter_mut() {
            stack.push(&mut node.children);
        }
    }
}

/// Distinct owners present in the forest, sorted.
pub fn owners(roots: &[Asset]) -> Vec<String> {
    flatten(roots)
        .iter()
        .filter_map(|a| a.owner.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct tags present in the forest, sorted.
pub fn tag_names(roots: &[Asset]) -> Vec<String> {
    flatten(roots)
        .iter()
        .flat_map(|a| a.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::FAVORITE_TAG;
    use crate::hierarchy::{build_hierarchy, find};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, day, 9, 0, 0).unwrap()
    }

    fn forest() -> Vec<Asset> {
        build_hierarchy(vec![
            Asset::new("ws1", "Workspace 1", AssetType::Workspace)
                .with_owner("ron")
                .with_modified(at(17)),
            Asset::new("folder1", "Folder 1", AssetType::Folder)
                .with_parent("ws1")
                .with_owner("ron")
                .with_modified(at(16)),
            Asset::new("app1", "Analytics App 1", AssetType::AnalyticsApp)
                .with_parent("folder1")
                .with_owner("april")
                .with_modified(at(15))
                .with_tags(["finance"]),
            Asset::new("pipeline1", "Data Pipeline 1", AssetType::Pipeline)
                .with_parent("folder1")
                .with_owner("ron")
                .with_modified(at(14))
                .with_tags([FAVORITE_TAG]),
            Asset::new("app2", "Analytics App 2", AssetType::AnalyticsApp)
                .with_parent("ws1")
                .with_owner("ron")
                .with_modified(at(13)),
            Asset::new("ws2", "Workspace 2", AssetType::Workspace)
                .with_owner("ron")
                .with_modified(at(12)),
            Asset::new("kb1", "Knowledge Base 1", AssetType::KnowledgeBase)
                .with_parent("ws2")
                .with_owner("leslie"),
        ])
    }

    fn ids(assets: &[Asset]) -> Vec<&str> {
        assets.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn search_keeps_ancestors_of_nested_match() {
        let roots = forest();
        let out = query_hierarchical(&roots, &FilterState::new().search("PIPELINE"));
        assert_eq!(ids(&out), vec!["ws1"]);
        assert_eq!(ids(&out[0].children), vec!["folder1"]);
        assert_eq!(ids(&out[0].children[0].children), vec!["pipeline1"]);
    }

    #[test]
    fn matching_parent_without_matching_children_has_empty_children() {
        let roots = forest();
        let out = query_hierarchical(&roots, &FilterState::new().search("workspace 2"));
        assert_eq!(ids(&out), vec!["ws2"]);
        assert!(out[0].children.is_empty());
    }

    #[test]
    fn filtering_never_mutates_source() {
        let roots = forest();
        let before = roots.clone();
        let _ = query_hierarchical(&roots, &FilterState::new().search("app").owner("april"));
        let _ = query_flat(&roots, &FilterState::new().view(CatalogView::Recent), RECENT_LIMIT);
        assert_eq!(roots, before);
    }

    #[test]
    fn predicates_compose_with_and() {
        let roots = forest();
        let filter = FilterState::new()
            .search("analytics")
            .asset_type(AssetType::AnalyticsApp)
            .owner("april");
        let flat = query_flat(&roots, &filter, RECENT_LIMIT);
        assert_eq!(ids(&flat), vec!["app1"]);

        let tree = query_hierarchical(&roots, &filter);
        assert_eq!(ids(&tree), vec!["ws1"]);
        assert!(find(&tree, "app1").is_some());
        assert!(find(&tree, "app2").is_none());
    }

    #[rstest]
    #[case(FilterState::new().asset_type(AssetType::KnowledgeBase), vec!["kb1"])]
    #[case(FilterState::new().owner("leslie"), vec!["kb1"])]
    #[case(FilterState::new().tag("finance"), vec!["app1"])]
    #[case(FilterState::new().tag("finance").tag("missing"), vec!["app1"])]
    #[case(FilterState::new().view(CatalogView::Favorites), vec!["pipeline1"])]
    #[case(FilterState::new().search("zzz"), vec![])]
    fn flat_filters(#[case] filter: FilterState, #[case] expected: Vec<&str>) {
        let out = query_flat(&forest(), &filter, RECENT_LIMIT);
        assert_eq!(ids(&out), expected);
    }

    #[test]
    fn favorites_tree_keeps_workspace_chain() {
        let out = query_hierarchical(&forest(), &FilterState::new().view(CatalogView::Favorites));
        assert_eq!(ids(&out), vec!["ws1"]);
        assert_eq!(ids(&out[0].children[0].children), vec!["pipeline1"]);
    }

    #[test]
    fn recent_orders_newest_first_and_drops_undated() {
        let roots = build_hierarchy(vec![
            Asset::new("t1", "One", AssetType::Script).with_modified(at(1)),
            Asset::new("t3", "Three", AssetType::Script).with_modified(at(3)),
            Asset::new("undated", "Undated", AssetType::Script),
            Asset::new("t2", "Two", AssetType::Script).with_modified(at(2)),
        ]);
        let out = query_flat(&roots, &FilterState::new().view(CatalogView::Recent), RECENT_LIMIT);
        assert_eq!(ids(&out), vec!["t3", "t2", "t1"]);
    }

    #[test]
    fn recent_is_stable_and_capped() {
        let mut flat = Vec::new();
        for i in 0..30 {
            flat.push(Asset::new(format!("s{:02}", i), "Same", AssetType::Script).with_modified(at(5)));
        }
        let out = query_flat(&flat, &FilterState::new().view(CatalogView::Recent), RECENT_LIMIT);
        assert_eq!(out.len(), RECENT_LIMIT);
        assert_eq!(out[0].id, "s00");
        assert_eq!(out[19].id, "s19");
    }

    #[test]
    fn undated_sorts_last() {
        let mut list = vec![
            Asset::new("none", "None", AssetType::Script),
            Asset::new("old", "Old", AssetType::Script).with_modified(at(1)),
            Asset::new("new", "New", AssetType::Script).with_modified(at(9)),
        ];
        sort_recent(&mut list);
        assert_eq!(ids(&list), vec!["new", "old", "none"]);
    }

    #[test]
    fn recent_tree_sorts_each_level() {
        let out = query_hierarchical(&forest(), &FilterState::new().view(CatalogView::Recent));
        assert_eq!(ids(&out), vec!["ws1", "ws2"]);
        assert_eq!(ids(&out[0].children), vec!["folder1", "app2"]);
        assert_eq!(ids(&out[0].children[0].children), vec!["app1", "pipeline1"]);
    }

    #[test]
    fn facets_are_sorted_and_distinct() {
        let roots = forest();
        assert_eq!(owners(&roots), vec!["april", "leslie", "ron"]);
        assert_eq!(tag_names(&roots), vec![FAVORITE_TAG.to_string(), "finance".to_string()]);
    }

    #[test]
    fn filter_state_activity() {
        assert!(!FilterState::new().is_active());
        assert!(!FilterState::new().search("   ").is_active());
        assert!(FilterState::new().view(CatalogView::Recent).is_active());
        assert!(FilterState::new().tag("x").is_active());
    }

    #[test]
    fn search_matches_text_as_typed() {
        let roots = forest();
        let flat = |q: &str| query_flat(&roots, &FilterState::new().search(q), 20);
        assert_eq!(ids(&flat(" app 1")), vec!["app1"]);
        assert!(flat("app 1 ").is_empty());
        assert_eq!(flat("   ").len(), 7);
    }
}
