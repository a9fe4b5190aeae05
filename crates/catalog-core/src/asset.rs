use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Globally unique asset identifier.
pub type AssetId = String;

/// Reserved tag value marking an asset as a favorite.
pub const FAVORITE_TAG: &str = "favorite";

/// Closed set of asset kinds shown in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetType {
    Connection,
    Pipeline,
    AnalyticsApp,
    Automation,
    Dataflow,
    DataProduct,
    KnowledgeBase,
    MonitorView,
    Script,
    Predict,
    TableRecipe,
    Glossary,
    AiAssistant,
    Workspace,
    Folder,
}

impl AssetType {
    pub const ALL: [AssetType; 15] = [
        AssetType::Connection,
        AssetType::Pipeline,
        AssetType::AnalyticsApp,
        AssetType::Automation,
        AssetType::Dataflow,
        AssetType::DataProduct,
        AssetType::KnowledgeBase,
        AssetType::MonitorView,
        AssetType::Script,
        AssetType::Predict,
        AssetType::TableRecipe,
        AssetType::Glossary,
        AssetType::AiAssistant,
        AssetType::Workspace,
        AssetType::Folder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Connection => "connection",
            AssetType::Pipeline => "pipeline",
            AssetType::AnalyticsApp => "analytics-app",
            AssetType::Automation => "automation",
            AssetType::Dataflow => "dataflow",
            AssetType::DataProduct => "data-product",
            AssetType::KnowledgeBase => "knowledge-base",
            AssetType::MonitorView => "monitor-view",
            AssetType::Script => "script",
            AssetType::Predict => "predict",
            AssetType::TableRecipe => "table-recipe",
            AssetType::Glossary => "glossary",
            AssetType::AiAssistant => "ai-assistant",
            AssetType::Workspace => "workspace",
            AssetType::Folder => "folder",
        }
    }

    /// Workspaces and folders hold other assets.
    pub fn is_container(&self) -> bool {
        matches!(self, AssetType::Workspace | AssetType::Folder)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CatalogError::Validation(format!("unknown asset type: {}", s)))
    }
}

/// Shape of the system a connection points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionType {
    Database,
    DataWarehouse,
    Lakehouse,
    Api,
    File,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Database => "database",
            ConnectionType::DataWarehouse => "data-warehouse",
            ConnectionType::Lakehouse => "lakehouse",
            ConnectionType::Api => "api",
            ConnectionType::File => "file",
        }
    }
}

impl FromStr for ConnectionType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(ConnectionType::Database),
            "data-warehouse" => Ok(ConnectionType::DataWarehouse),
            "lakehouse" => Ok(ConnectionType::Lakehouse),
            "api" => Ok(ConnectionType::Api),
            "file" => Ok(ConnectionType::File),
            other => Err(CatalogError::Validation(format!(
                "unknown connection type: {}",
                other
            ))),
        }
    }
}

/// Connection shape and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetadata {
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl ConnectionMetadata {
    pub fn new(connection_type: ConnectionType) -> Self {
        Self {
            connection_type,
            host: None,
            port: None,
            database: None,
            username: None,
            schema: None,
            account: None,
            warehouse: None,
            role: None,
            api_key: None,
            client_id: None,
            client_secret: None,
            account_id: None,
        }
    }
}

/// Source, destination and table selection of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetadata {
    pub source_connection_id: AssetId,
    pub destination_connection_id: AssetId,
    #[serde(default)]
    pub selected_table_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Type-specific payload. Each variant is only valid on its matching asset type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AssetMetadata {
    Connection(ConnectionMetadata),
    Pipeline(PipelineMetadata),
}

impl AssetMetadata {
    /// The asset type this payload belongs to.
    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetMetadata::Connection(_) => AssetType::Connection,
            AssetMetadata::Pipeline(_) => AssetType::Pipeline,
        }
    }
}

/// A typed, identifiable catalog entry.
///
/// In tree form `children` holds the materialized subtree; in flat form it is
/// empty and `parent_id` alone carries the edge.
///
/// `Clone`, `PartialEq` and `Drop` walk the subtree with an explicit stack,
/// so arbitrarily deep trees are safe to copy, compare and free.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AssetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AssetMetadata>,
    /// Write sequence, bumped on every local mutation.
    #[serde(default)]
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Asset>,
}

impl Asset {
    /// Minimal asset with every optional attribute unset.
    pub fn new(id: impl Into<AssetId>, name: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            asset_type,
            description: None,
            parent_id: None,
            owner: None,
            modified: None,
            quality: None,
            location: None,
            icon: None,
            is_pinned: false,
            tags: Vec::new(),
            collections: Vec::new(),
            metadata: None,
            revision: 0,
            children: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<AssetId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Add a tag unless already present. Returns whether the set changed.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.has_tag(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Remove a tag. Returns whether the set changed.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        before != self.tags.len()
    }

    pub fn is_favorite(&self) -> bool {
        self.has_tag(FAVORITE_TAG)
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        if favorite {
            self.add_tag(FAVORITE_TAG);
        } else {
            self.remove_tag(FAVORITE_TAG);
        }
    }

    /// Flip the favorite marker, returning the new state.
    pub fn toggle_favorite(&mut self) -> bool {
        let favorite = !self.is_favorite();
        self.set_favorite(favorite);
        favorite
    }

    /// Stamp a mutation: refresh `modified` and bump the write sequence.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.modified = Some(now);
        self.revision += 1;
    }

    /// Clone of this record in flat form.
    pub fn without_children(&self) -> Asset {
        Asset {
            id: self.id.clone(),
            name: self.name.clone(),
            asset_type: self.asset_type,
            description: self.description.clone(),
            parent_id: self.parent_id.clone(),
            owner: self.owner.clone(),
            modified: self.modified,
            quality: self.quality,
            location: self.location.clone(),
            icon: self.icon.clone(),
            is_pinned: self.is_pinned,
            tags: self.tags.clone(),
            collections: self.collections.clone(),
            metadata: self.metadata.clone(),
            revision: self.revision,
            children: Vec::new(),
        }
    }

    pub fn connection_metadata(&self) -> Option<&ConnectionMetadata> {
        match &self.metadata {
            Some(AssetMetadata::Connection(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn pipeline_metadata(&self) -> Option<&PipelineMetadata> {
        match &self.metadata {
            Some(AssetMetadata::Pipeline(meta)) => Some(meta),
            _ => None,
        }
    }
}

impl Asset {
    /// Attribute equality, ignoring `children`.
    fn same_record(&self, other: &Asset) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.asset_type == other.asset_type
            && self.description == other.description
            && self.parent_id == other.parent_id
            && self.owner == other.owner
            && self.modified == other.modified
            && self.quality == other.quality
            && self.location == other.location
            && self.icon == other.icon
            && self.is_pinned == other.is_pinned
            && self.tags == other.tags
            && self.collections == other.collections
            && self.metadata == other.metadata
            && self.revision == other.revision
    }
}

impl Clone for Asset {
    fn clone(&self) -> Self {
        // Pre-order copy with parent links; indices only ever point backwards.
        let mut nodes: Vec<(Asset, Option<usize>)> = Vec::new();
        let mut stack: Vec<(&Asset, Option<usize>)> =
            self.children.iter().rev().map(|c| (c, None)).collect();
        while let Some((node, parent)) = stack.pop() {
            let index = nodes.len();
            nodes.push((node.without_children(), parent));
            stack.extend(node.children.iter().rev().map(|c| (c, Some(index))));
        }

        // Reverse order finishes every child before its parent takes it;
        // children arrive last-first and are flipped once complete.
        let mut root = self.without_children();
        while let Some((mut node, parent)) = nodes.pop() {
            node.children.reverse();
            match parent {
                Some(p) => nodes[p].0.children.push(node),
                None => root.children.push(node),
            }
        }
        root.children.reverse();
        root
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if !a.same_record(b) || a.children.len() != b.children.len() {
                return false;
            }
            stack.extend(a.children.iter().zip(b.children.iter()));
        }
        true
    }
}

impl Drop for Asset {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// Caller-supplied shape for creating an asset.
///
/// Owner, quality and modified time fall back to catalog defaults when absent;
/// the id is generated when not supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDraft {
    #[serde(default)]
    pub id: Option<AssetId>,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub parent_id: Option<AssetId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub metadata: Option<AssetMetadata>,
}

impl AssetDraft {
    pub fn new(name: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            id: None,
            name: name.into(),
            asset_type,
            parent_id: None,
            description: None,
            owner: None,
            quality: None,
            location: None,
            icon: None,
            is_pinned: false,
            tags: Vec::new(),
            collections: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<AssetId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<AssetId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Check the draft's own fields. Id uniqueness is checked by the catalog.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(CatalogError::Validation("id must not be blank".into()));
            }
            if self.parent_id.as_deref() == Some(id.as_str()) {
                return Err(CatalogError::Validation(format!(
                    "asset {} cannot be its own parent",
                    id
                )));
            }
        }
        validate_fields(&self.name, self.asset_type, self.quality, self.metadata.as_ref())
    }

    /// Materialize the draft, filling defaults for owner and quality.
    pub fn into_asset(
        self,
        id: AssetId,
        default_owner: &str,
        default_quality: u8,
        now: DateTime<Utc>,
    ) -> Asset {
        let mut asset = Asset {
            id,
            name: self.name.trim().to_string(),
            asset_type: self.asset_type,
            description: self.description,
            parent_id: self.parent_id,
            owner: Some(self.owner.unwrap_or_else(|| default_owner.to_string())),
            modified: Some(now),
            quality: Some(self.quality.unwrap_or(default_quality)),
            location: self.location,
            icon: self.icon,
            is_pinned: self.is_pinned,
            tags: Vec::new(),
            collections: Vec::new(),
            metadata: self.metadata,
            revision: 1,
            children: Vec::new(),
        };
        for tag in self.tags {
            asset.add_tag(tag);
        }
        for collection in self.collections {
            if !asset.collections.contains(&collection) {
                asset.collections.push(collection);
            }
        }
        asset
    }
}

/// Partial update. Absent fields are left untouched; for clearable fields
/// `Some(None)` (JSON `null`) clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<AssetId>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub owner: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub quality: Option<Option<u8>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub icon: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Option<AssetMetadata>>,
}

impl AssetPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn parent(parent_id: Option<AssetId>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    /// Whether the patch moves the asset to a different parent.
    pub fn moves(&self, asset: &Asset) -> bool {
        matches!(&self.parent_id, Some(parent) if *parent != asset.parent_id)
    }

    /// Shallow-merge the provided fields into `asset`.
    ///
    /// Does not stamp `modified`; the caller does that after validation.
    pub fn apply_to(&self, asset: &mut Asset) {
        if let Some(name) = &self.name {
            asset.name = name.trim().to_string();
        }
        if let Some(asset_type) = self.asset_type {
            asset.asset_type = asset_type;
        }
        if let Some(description) = &self.description {
            asset.description = description.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            asset.parent_id = parent_id.clone();
        }
        if let Some(owner) = &self.owner {
            asset.owner = owner.clone();
        }
        if let Some(quality) = self.quality {
            asset.quality = quality;
        }
        if let Some(location) = &self.location {
            asset.location = location.clone();
        }
        if let Some(icon) = &self.icon {
            asset.icon = icon.clone();
        }
        if let Some(pinned) = self.is_pinned {
            asset.is_pinned = pinned;
        }
        if let Some(tags) = &self.tags {
            asset.tags.clear();
            for tag in tags {
                asset.add_tag(tag.clone());
            }
        }
        if let Some(collections) = &self.collections {
            asset.collections.clear();
            for collection in collections {
                if !asset.collections.contains(collection) {
                    asset.collections.push(collection.clone());
                }
            }
        }
        if let Some(metadata) = &self.metadata {
            asset.metadata = metadata.clone();
        }
    }
}

/// Field rules shared by drafts and patched assets.
pub fn validate_asset(asset: &Asset) -> Result<(), CatalogError> {
    if asset.parent_id.as_deref() == Some(asset.id.as_str()) {
        return Err(CatalogError::Validation(format!(
            "asset {} cannot be its own parent",
            asset.id
        )));
    }
    validate_fields(&asset.name, asset.asset_type, asset.quality, asset.metadata.as_ref())
}

fn validate_fields(
    name: &str,
    asset_type: AssetType,
    quality: Option<u8>,
    metadata: Option<&AssetMetadata>,
) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::Validation("name must not be empty".into()));
    }
    if let Some(q) = quality {
        if q > 100 {
            return Err(CatalogError::Validation(format!(
                "quality must be between 0 and 100, got {}",
                q
            )));
        }
    }
    if let Some(meta) = metadata {
        if meta.asset_type() != asset_type {
            return Err(CatalogError::Validation(format!(
                "{} metadata cannot be attached to a {} asset",
                meta.asset_type(),
                asset_type
            )));
        }
    }
    Ok(())
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn connection() -> Asset {
        let mut asset = Asset::new("conn1", "Warehouse", AssetType::Connection).with_parent("ws1");
        let mut meta = ConnectionMetadata::new(ConnectionType::DataWarehouse);
        meta.host = Some("warehouse.internal".into());
        meta.port = Some(5432);
        asset.metadata = Some(AssetMetadata::Connection(meta));
        asset
    }

    #[test]
    fn asset_type_round_trips_through_str() {
        for t in AssetType::ALL {
            assert_eq!(t.as_str().parse::<AssetType>().unwrap(), t);
        }
        assert!("spreadsheet".parse::<AssetType>().is_err());
    }

    #[test]
    fn asset_serializes_in_ui_shape() {
        let asset = connection();
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["type"], "connection");
        assert_eq!(json["parentId"], "ws1");
        assert_eq!(json["metadata"]["kind"], "connection");
        assert_eq!(json["metadata"]["connectionType"], "data-warehouse");
        assert!(json.get("children").is_none());
    }

    #[test]
    fn asset_serde_round_trip_keeps_timestamp() {
        let modified = Utc.with_ymd_and_hms(2025, 11, 17, 8, 30, 15).unwrap();
        let asset = connection().with_modified(modified).with_tags(["pii"]);
        let json = serde_json::to_string(&asset).unwrap();
        assert!(json.contains("2025-11-17T08:30:15Z"));
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
    }

    #[test]
    fn favorite_toggle_twice_restores_tags() {
        let mut asset = Asset::new("a1", "Orders", AssetType::Dataflow).with_tags(["sales", "daily"]);
        let original = asset.tags.clone();
        assert!(asset.toggle_favorite());
        assert!(asset.is_favorite());
        assert!(!asset.toggle_favorite());
        assert_eq!(asset.tags, original);
    }

    #[test]
    fn add_tag_ignores_duplicates() {
        let mut asset = Asset::new("a1", "Orders", AssetType::Dataflow);
        assert!(asset.add_tag("sales"));
        assert!(!asset.add_tag("sales"));
        assert_eq!(asset.tags, vec!["sales".to_string()]);
    }

    #[test]
    fn touch_bumps_revision_and_modified() {
        let mut asset = Asset::new("a1", "Orders", AssetType::Dataflow);
        let now = Utc::now();
        asset.touch(now);
        asset.touch(now);
        assert_eq!(asset.revision, 2);
        assert_eq!(asset.modified, Some(now));
    }

    #[test]
    fn draft_fills_defaults() {
        let now = Utc::now();
        let asset = AssetDraft::new("  Test  ", AssetType::Connection)
            .with_parent("ws1")
            .into_asset("a1".into(), "Catalog Admin", 82, now);
        assert_eq!(asset.name, "Test");
        assert_eq!(asset.owner.as_deref(), Some("Catalog Admin"));
        assert_eq!(asset.quality, Some(82));
        assert_eq!(asset.modified, Some(now));
        assert_eq!(asset.parent_id.as_deref(), Some("ws1"));
    }

    #[test]
    fn draft_rejects_mismatched_metadata() {
        let draft = AssetDraft::new("Nightly load", AssetType::Pipeline).with_metadata(
            AssetMetadata::Connection(ConnectionMetadata::new(ConnectionType::Api)),
        );
        let err = draft.validate().unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn draft_rejects_blank_name_and_bad_quality() {
        assert!(AssetDraft::new("   ", AssetType::Folder).validate().is_err());
        let mut draft = AssetDraft::new("Folder", AssetType::Folder);
        draft.quality = Some(101);
        assert!(draft.validate().is_err());
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: AssetPatch =
            serde_json::from_str(r#"{"name": "Renamed", "description": null}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("Renamed"));
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.owner, None);

        let mut asset = Asset::new("a1", "Orders", AssetType::Dataflow).with_owner("sam");
        asset.description = Some("old".into());
        patch.apply_to(&mut asset);
        assert_eq!(asset.name, "Renamed");
        assert_eq!(asset.description, None);
        assert_eq!(asset.owner.as_deref(), Some("sam"));
    }

    #[test]
    fn patch_detects_moves() {
        let asset = Asset::new("a1", "Orders", AssetType::Dataflow).with_parent("ws1");
        assert!(!AssetPatch::parent(Some("ws1".into())).moves(&asset));
        assert!(AssetPatch::parent(Some("ws2".into())).moves(&asset));
        assert!(AssetPatch::parent(None).moves(&asset));
        assert!(!AssetPatch::name("x").moves(&asset));
    }

    fn chain(depth: usize) -> Asset {
        let mut node = Asset::new(format!("n{}", depth), "leaf", AssetType::Folder);
        for i in (0..depth).rev() {
            let mut parent = Asset::new(format!("n{}", i), "folder", AssetType::Folder);
            node.parent_id = Some(parent.id.clone());
            parent.children.push(node);
            node = parent;
        }
        node
    }

    #[test]
    fn clone_keeps_sibling_order() {
        let mut root = Asset::new("ws", "Workspace", AssetType::Workspace);
        for id in ["a", "b", "c"] {
            let mut child = Asset::new(id, id, AssetType::Folder).with_parent("ws");
            child
                .children
                .push(Asset::new(format!("{}-leaf", id), "leaf", AssetType::Script));
            root.children.push(child);
        }
        let copy = root.clone();
        let ids: Vec<&str> = copy.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(copy.children[1].children[0].id, "b-leaf");
        assert_eq!(copy, root);

        let mut changed = root.clone();
        changed.children[2].children[0].name = "other".into();
        assert_ne!(changed, root);
    }

    #[test]
    fn deep_chain_clones_compares_and_drops() {
        let deep = chain(200_000);
        let copy = deep.clone();
        assert_eq!(copy, deep);
        drop(copy);
        drop(deep);
    }
}
