use async_trait::async_trait;

use crate::asset::{Asset, AssetId};
use crate::error::{RemoteError, StorageError};

/// Key/value string store backing local persistence.
///
/// Scoped to one profile; values survive process restarts for durable
/// implementations.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// The remote source of truth for the catalog.
///
/// Treated as unreliable: any call may fail, and the catalog degrades
/// instead of propagating the failure.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Every asset the service knows about, in flat form.
    async fn fetch_all(&self) -> Result<Vec<Asset>, RemoteError>;

    /// Insert or replace one asset (without children).
    async fn upsert(&self, asset: &Asset) -> Result<(), RemoteError>;

    /// Delete one asset. Returns `RemoteError::NotFound` when it is absent.
    async fn delete(&self, id: &AssetId) -> Result<(), RemoteError>;
}
