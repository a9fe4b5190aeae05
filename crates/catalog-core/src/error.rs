//! Error types for catalog-core

use thiserror::Error;

use crate::asset::AssetId;

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors returned by the catalog facade.
///
/// These only describe caller mistakes. Network and storage failures never
/// surface here; they degrade the sync status instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// No asset with this id exists in the tree
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    /// An asset with this id already exists
    #[error("Asset already exists: {0}")]
    AlreadyExists(AssetId),

    /// Draft or patch failed boundary validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation would break the tree (e.g. moving a folder under itself)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A remote catalog was supplied without a running Tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors from the remote catalog service boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// No remote endpoint is configured for this session
    #[error("Remote catalog is not configured")]
    Unconfigured,

    /// The service could not be reached or the request failed in transit
    #[error("Remote catalog unreachable: {0}")]
    Unreachable(String),

    /// The service has no record with this id
    #[error("Remote asset not found: {0}")]
    NotFound(AssetId),

    /// The service answered but refused the request
    #[error("Remote catalog rejected request: {0}")]
    Rejected(String),

    /// A response or stored row could not be decoded
    #[error("Remote payload could not be decoded: {0}")]
    Decode(String),
}

/// Errors from a key-value store backing local persistence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Storage is disabled or not reachable at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Storage refused the write because it is full
    #[error("Storage quota exceeded for key {0}")]
    QuotaExceeded(String),

    /// Underlying backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for RemoteError {
    fn from(err: rusqlite::Error) -> Self {
        RemoteError::Unreachable(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Unreachable(err.to_string())
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
