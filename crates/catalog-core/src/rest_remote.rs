//! Remote catalog over a PostgREST-style HTTP/JSON row API.
//!
//! Each table is a resource under the base URL (`{base}/assets`,
//! `{base}/asset_tags`, ...). Filters use the `column=eq.value` syntax and
//! upserts rely on `Prefer: resolution=merge-duplicates`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::asset::{Asset, AssetId};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::rows::{
    AssetRow, RowSet, ASSETS_TABLE, ASSET_COLLECTIONS_TABLE, ASSET_TAGS_TABLE,
    CONNECTION_METADATA_TABLE, PIPELINE_METADATA_TABLE,
};
use crate::store::RemoteCatalog;

const DEPENDENT_TABLES: [&str; 4] = [
    CONNECTION_METADATA_TABLE,
    PIPELINE_METADATA_TABLE,
    ASSET_TAGS_TABLE,
    ASSET_COLLECTIONS_TABLE,
];

pub struct RestRemoteCatalog {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestRemoteCatalog {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RemoteError::Unconfigured);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let base_url = config.base_url.as_deref().ok_or(RemoteError::Unconfigured)?;
        Self::new(
            base_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn select<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, RemoteError> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*")]);
        let response = check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn insert<T: Serialize>(&self, table: &str, rows: &[T], upsert: bool) -> Result<(), RemoteError> {
        if rows.is_empty() {
            return Ok(());
        }
        let prefer = if upsert {
            "resolution=merge-duplicates,return=minimal"
        } else {
            "return=minimal"
        };
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", prefer)
            .json(rows);
        check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn delete_where(&self, table: &str, column: &str, id: &str) -> Result<Response, RemoteError> {
        let filter = format!("eq.{}", id);
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[(column, filter.as_str())])
            .header("Prefer", "return=representation");
        check(self.authorize(request).send().await?).await
    }
}

/// Map non-success statuses onto remote errors.
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = format!("{}: {}", status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RemoteError::Unreachable(message)
    } else {
        RemoteError::Rejected(message)
    }
}

#[async_trait]
impl RemoteCatalog for RestRemoteCatalog {
    async fn fetch_all(&self) -> Result<Vec<Asset>, RemoteError> {
        let rows = RowSet {
            assets: self.select(ASSETS_TABLE).await?,
            connection_metadata: self.select(CONNECTION_METADATA_TABLE).await?,
            pipeline_metadata: self.select(PIPELINE_METADATA_TABLE).await?,
            asset_tags: self.select(ASSET_TAGS_TABLE).await?,
            asset_collections: self.select(ASSET_COLLECTIONS_TABLE).await?,
        };
        tracing::debug!(assets = rows.assets.len(), "fetched remote catalog");
        Ok(rows.assemble())
    }

    async fn upsert(&self, asset: &Asset) -> Result<(), RemoteError> {
        let rows = RowSet::from_asset(asset);
        self.insert(ASSETS_TABLE, &rows.assets, true).await?;
        for table in DEPENDENT_TABLES {
            self.delete_where(table, "asset_id", &asset.id).await?;
        }
        self.insert(CONNECTION_METADATA_TABLE, &rows.connection_metadata, false)
            .await?;
        self.insert(PIPELINE_METADATA_TABLE, &rows.pipeline_metadata, false)
            .await?;
        self.insert(ASSET_TAGS_TABLE, &rows.asset_tags, false).await?;
        self.insert(ASSET_COLLECTIONS_TABLE, &rows.asset_collections, false)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &AssetId) -> Result<(), RemoteError> {
        for table in DEPENDENT_TABLES {
            self.delete_where(table, "asset_id", id).await?;
        }
        let deleted: Vec<AssetRow> = self.delete_where(ASSETS_TABLE, "id", id).await?.json().await?;
        if deleted.is_empty() {
            return Err(RemoteError::NotFound(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let remote =
            RestRemoteCatalog::new(" https://db.example.com/rest/v1/ ", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(remote.base_url(), "https://db.example.com/rest/v1");
        assert_eq!(
            remote.table_url(ASSET_TAGS_TABLE),
            "https://db.example.com/rest/v1/asset_tags"
        );
    }

    #[test]
    fn missing_base_url_is_unconfigured() {
        let config = RemoteConfig::default();
        assert!(matches!(
            RestRemoteCatalog::from_config(&config),
            Err(RemoteError::Unconfigured)
        ));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            RemoteError::Unreachable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key"),
            RemoteError::Rejected(m) if m.contains("bad key")
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let remote =
            RestRemoteCatalog::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            remote.fetch_all().await,
            Err(RemoteError::Unreachable(_))
        ));
    }
}
