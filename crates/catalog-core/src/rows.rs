//! Row model of the remote catalog service.
//!
//! The service stores assets across five tables: `assets`,
//! `connection_metadata`, `pipeline_metadata`, `asset_tags` and
//! `asset_collections`. These types mirror those rows one to one and convert
//! to and from [`Asset`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::{
    Asset, AssetId, AssetMetadata, AssetType, ConnectionMetadata, ConnectionType, PipelineMetadata,
};

pub const ASSETS_TABLE: &str = "assets";
pub const CONNECTION_METADATA_TABLE: &str = "connection_metadata";
pub const PIPELINE_METADATA_TABLE: &str = "pipeline_metadata";
pub const ASSET_TAGS_TABLE: &str = "asset_tags";
pub const ASSET_COLLECTIONS_TABLE: &str = "asset_collections";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRow {
    pub id: AssetId,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<AssetId>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub quality: Option<i64>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub revision: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetadataRow {
    pub asset_id: AssetId,
    pub connection_type: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadataRow {
    pub asset_id: AssetId,
    pub source_connection_id: AssetId,
    pub destination_connection_id: AssetId,
    #[serde(default)]
    pub selected_table_ids: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTagRow {
    pub asset_id: AssetId,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCollectionRow {
    pub asset_id: AssetId,
    pub collection: String,
}

/// Every row belonging to a set of assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub assets: Vec<AssetRow>,
    pub connection_metadata: Vec<ConnectionMetadataRow>,
    pub pipeline_metadata: Vec<PipelineMetadataRow>,
    pub asset_tags: Vec<AssetTagRow>,
    pub asset_collections: Vec<AssetCollectionRow>,
}

impl RowSet {
    /// Split one asset (children ignored) into its rows.
    pub fn from_asset(asset: &Asset) -> Self {
        let mut rows = RowSet {
            assets: vec![AssetRow {
                id: asset.id.clone(),
                name: asset.name.clone(),
                asset_type: asset.asset_type.as_str().to_string(),
                description: asset.description.clone(),
                parent_id: asset.parent_id.clone(),
                owner: asset.owner.clone(),
                quality: asset.quality.map(i64::from),
                modified: asset.modified,
                location: asset.location.clone(),
                pinned: asset.is_pinned,
                icon: asset.icon.clone(),
                revision: i64::try_from(asset.revision).unwrap_or(i64::MAX),
            }],
            ..RowSet::default()
        };

        match &asset.metadata {
            Some(AssetMetadata::Connection(m)) => {
                rows.connection_metadata.push(ConnectionMetadataRow {
                    asset_id: asset.id.clone(),
                    connection_type: m.connection_type.as_str().to_string(),
                    host: m.host.clone(),
                    port: m.port.map(i64::from),
                    database: m.database.clone(),
                    username: m.username.clone(),
                    schema: m.schema.clone(),
                    account: m.account.clone(),
                    warehouse: m.warehouse.clone(),
                    role: m.role.clone(),
                    api_key: m.api_key.clone(),
                    client_id: m.client_id.clone(),
                    client_secret: m.client_secret.clone(),
                    account_id: m.account_id.clone(),
                });
            }
            Some(AssetMetadata::Pipeline(m)) => {
                rows.pipeline_metadata.push(PipelineMetadataRow {
                    asset_id: asset.id.clone(),
                    source_connection_id: m.source_connection_id.clone(),
                    destination_connection_id: m.destination_connection_id.clone(),
                    selected_table_ids: m.selected_table_ids.clone(),
                    description: m.description.clone(),
                    workspace: m.workspace.clone(),
                });
            }
            None => {}
        }

        rows.asset_tags = asset
            .tags
            .iter()
            .map(|tag| AssetTagRow {
                asset_id: asset.id.clone(),
                tag: tag.clone(),
            })
            .collect();
        rows.asset_collections = asset
            .collections
            .iter()
            .map(|collection| AssetCollectionRow {
                asset_id: asset.id.clone(),
                collection: collection.clone(),
            })
            .collect();
        rows
    }

    /// Join the tables back into flat assets, in `assets` row order.
    ///
    /// Rows with an unknown type are skipped with a warning, as is metadata
    /// that does not parse or does not match its asset's type.
    pub fn assemble(self) -> Vec<Asset> {
        let mut connections: HashMap<AssetId, ConnectionMetadataRow> = self
            .connection_metadata
            .into_iter()
            .map(|row| (row.asset_id.clone(), row))
            .collect();
        let mut pipelines: HashMap<AssetId, PipelineMetadataRow> = self
            .pipeline_metadata
            .into_iter()
            .map(|row| (row.asset_id.clone(), row))
            .collect();
        let mut tags: HashMap<AssetId, Vec<String>> = HashMap::new();
        for row in self.asset_tags {
            tags.entry(row.asset_id).or_default().push(row.tag);
        }
        let mut collections: HashMap<AssetId, Vec<String>> = HashMap::new();
        for row in self.asset_collections {
            collections.entry(row.asset_id).or_default().push(row.collection);
        }

        let mut out = Vec::with_capacity(self.assets.len());
        for row in self.assets {
            let asset_type: AssetType = match row.asset_type.parse() {
                Ok(t) => t,
                Err(_) => {
                    tracing::warn!(id = %row.id, asset_type = %row.asset_type, "skipping row with unknown type");
                    continue;
                }
            };

            let mut asset = Asset::new(row.id.clone(), row.name, asset_type);
            asset.description = row.description;
            asset.parent_id = row.parent_id;
            asset.owner = row.owner;
            asset.quality = row.quality.and_then(|q| u8::try_from(q).ok()).filter(|q| *q <= 100);
            asset.modified = row.modified;
            asset.location = row.location;
            asset.is_pinned = row.pinned;
            asset.icon = row.icon;
            asset.revision = u64::try_from(row.revision).unwrap_or(0);

            for tag in tags.remove(&row.id).unwrap_or_default() {
                asset.add_tag(tag);
            }
            for collection in collections.remove(&row.id).unwrap_or_default() {
                if !asset.collections.contains(&collection) {
                    asset.collections.push(collection);
                }
            }

            asset.metadata = match asset_type {
                AssetType::Connection => connections
                    .remove(&row.id)
                    .and_then(connection_metadata)
                    .map(AssetMetadata::Connection),
                AssetType::Pipeline => pipelines
                    .remove(&row.id)
                    .map(pipeline_metadata)
                    .map(AssetMetadata::Pipeline),
                _ => None,
            };
            out.push(asset);
        }
        out
    }
}

fn connection_metadata(row: ConnectionMetadataRow) -> Option<ConnectionMetadata> {
    let connection_type: ConnectionType = match row.connection_type.parse() {
        Ok(t) => t,
        Err(_) => {
            tracing::warn!(id = %row.asset_id, "dropping connection metadata with unknown type");
            return None;
        }
    };
    Some(ConnectionMetadata {
        connection_type,
        host: row.host,
        port: row.port.and_then(|p| u16::try_from(p).ok()),
        database: row.database,
        username: row.username,
        schema: row.schema,
        account: row.account,
        warehouse: row.warehouse,
        role: row.role,
        api_key: row.api_key,
        client_id: row.client_id,
        client_secret: row.client_secret,
        account_id: row.account_id,
    })
}

fn pipeline_metadata(row: PipelineMetadataRow) -> PipelineMetadata {
    PipelineMetadata {
        source_connection_id: row.source_connection_id,
        destination_connection_id: row.destination_connection_id,
        selected_table_ids: row.selected_table_ids,
        description: row.description,
        workspace: row.workspace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Asset {
        let mut meta = ConnectionMetadata::new(ConnectionType::DataWarehouse);
        meta.account = Some("acme".into());
        meta.port = Some(443);
        let mut asset = Asset::new("c1", "Warehouse", AssetType::Connection)
            .with_parent("ws1")
            .with_tags(["finance", "favorite"]);
        asset.metadata = Some(AssetMetadata::Connection(meta));
        asset.collections = vec!["prod".into()];
        asset.revision = 3;
        asset
    }

    #[test]
    fn asset_splits_into_table_rows() {
        let rows = RowSet::from_asset(&connection());
        assert_eq!(rows.assets.len(), 1);
        assert_eq!(rows.assets[0].asset_type, "connection");
        assert_eq!(rows.connection_metadata[0].connection_type, "data-warehouse");
        assert_eq!(rows.asset_tags.len(), 2);
        assert_eq!(rows.asset_collections[0].collection, "prod");
        assert!(rows.pipeline_metadata.is_empty());
    }

    #[test]
    fn assemble_restores_asset() {
        let original = connection();
        let assets = RowSet::from_asset(&original).assemble();
        assert_eq!(assets, vec![original]);
    }

    #[test]
    fn assemble_skips_unknown_types() {
        let mut rows = RowSet::from_asset(&connection());
        rows.assets[0].asset_type = "spreadsheet".into();
        assert!(rows.assemble().is_empty());
    }

    #[test]
    fn mismatched_metadata_is_ignored() {
        let mut rows = RowSet::from_asset(&Asset::new("s1", "Script", AssetType::Script));
        rows.pipeline_metadata.push(PipelineMetadataRow {
            asset_id: "s1".into(),
            source_connection_id: "a".into(),
            destination_connection_id: "b".into(),
            selected_table_ids: vec![],
            description: None,
            workspace: None,
        });
        let assets = rows.assemble();
        assert_eq!(assets[0].metadata, None);
    }
}
