use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::asset::{Asset, AssetId};
use crate::error::RemoteError;
use crate::rows::{
    AssetCollectionRow, AssetRow, AssetTagRow, ConnectionMetadataRow, PipelineMetadataRow, RowSet,
};
use crate::store::RemoteCatalog;

/// SQLite-backed implementation of the remote catalog row service.
///
/// Uses the same five-table layout as the hosted service, which makes it a
/// self-contained backend for single-machine deployments and tests.
/// Queries run on the blocking thread pool.
pub struct SqliteRemoteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRemoteCatalog {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, RemoteError> {
        let conn = Connection::open(path)
            .map_err(|e| RemoteError::Unreachable(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, RemoteError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RemoteError::Unreachable(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, RemoteError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), RemoteError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                description TEXT,
                parent_id TEXT,
                owner TEXT,
                quality INTEGER,
                modified TEXT,
                location TEXT,
                pinned INTEGER NOT NULL DEFAULT 0,
                icon TEXT,
                revision INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS connection_metadata (
                asset_id TEXT PRIMARY KEY REFERENCES assets(id) ON DELETE CASCADE,
                connection_type TEXT NOT NULL,
                host TEXT,
                port INTEGER,
                database TEXT,
                username TEXT,
                schema TEXT,
                account TEXT,
                warehouse TEXT,
                role TEXT,
                api_key TEXT,
                client_id TEXT,
                client_secret TEXT,
                account_id TEXT
            );

            CREATE TABLE IF NOT EXISTS pipeline_metadata (
                asset_id TEXT PRIMARY KEY REFERENCES assets(id) ON DELETE CASCADE,
                source_connection_id TEXT NOT NULL,
                destination_connection_id TEXT NOT NULL,
                selected_table_ids TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                workspace TEXT
            );

            CREATE TABLE IF NOT EXISTS asset_tags (
                asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                PRIMARY KEY (asset_id, tag)
            );

            CREATE TABLE IF NOT EXISTS asset_collections (
                asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
                collection TEXT NOT NULL,
                PRIMARY KEY (asset_id, collection)
            );

            CREATE INDEX IF NOT EXISTS idx_assets_parent ON assets(parent_id);
            CREATE INDEX IF NOT EXISTS idx_asset_tags_tag ON asset_tags(tag);
            ",
        )
        .map_err(|e| RemoteError::Rejected(format!("init_schema: {}", e)))?;
        Ok(())
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&Connection) -> Result<T, RemoteError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
            work(&conn)
        })
        .await
        .map_err(|e| RemoteError::Unreachable(format!("sqlite task: {}", e)))?
    }

    fn read_rows(conn: &Connection) -> Result<RowSet, RemoteError> {
        let mut rows = RowSet::default();

        let mut stmt = conn.prepare(
            "SELECT id, name, type, description, parent_id, owner, quality, modified, location, pinned, icon, revision
             FROM assets ORDER BY rowid",
        )?;
        let assets = stmt
            .query_map([], |row| {
                let modified: Option<String> = row.get(7)?;
                Ok((
                    AssetRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        asset_type: row.get(2)?,
                        description: row.get(3)?,
                        parent_id: row.get(4)?,
                        owner: row.get(5)?,
                        quality: row.get(6)?,
                        modified: None,
                        location: row.get(8)?,
                        pinned: row.get(9)?,
                        icon: row.get(10)?,
                        revision: row.get(11)?,
                    },
                    modified,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (mut row, modified) in assets {
            row.modified = modified.as_deref().and_then(parse_timestamp);
            rows.assets.push(row);
        }

        let mut stmt = conn.prepare(
            "SELECT asset_id, connection_type, host, port, database, username, schema, account,
                    warehouse, role, api_key, client_id, client_secret, account_id
             FROM connection_metadata",
        )?;
        rows.connection_metadata = stmt
            .query_map([], |row| {
                Ok(ConnectionMetadataRow {
                    asset_id: row.get(0)?,
                    connection_type: row.get(1)?,
                    host: row.get(2)?,
                    port: row.get(3)?,
                    database: row.get(4)?,
                    username: row.get(5)?,
                    schema: row.get(6)?,
                    account: row.get(7)?,
                    warehouse: row.get(8)?,
                    role: row.get(9)?,
                    api_key: row.get(10)?,
                    client_id: row.get(11)?,
                    client_secret: row.get(12)?,
                    account_id: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT asset_id, source_connection_id, destination_connection_id, selected_table_ids, description, workspace
             FROM pipeline_metadata",
        )?;
        let pipelines = stmt
            .query_map([], |row| {
                let tables: String = row.get(3)?;
                Ok((
                    PipelineMetadataRow {
                        asset_id: row.get(0)?,
                        source_connection_id: row.get(1)?,
                        destination_connection_id: row.get(2)?,
                        selected_table_ids: Vec::new(),
                        description: row.get(4)?,
                        workspace: row.get(5)?,
                    },
                    tables,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (mut row, tables) in pipelines {
            row.selected_table_ids = serde_json::from_str(&tables)?;
            rows.pipeline_metadata.push(row);
        }

        let mut stmt = conn.prepare("SELECT asset_id, tag FROM asset_tags ORDER BY rowid")?;
        rows.asset_tags = stmt
            .query_map([], |row| {
                Ok(AssetTagRow {
                    asset_id: row.get(0)?,
                    tag: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT asset_id, collection FROM asset_collections ORDER BY rowid")?;
        rows.asset_collections = stmt
            .query_map([], |row| {
                Ok(AssetCollectionRow {
                    asset_id: row.get(0)?,
                    collection: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn write_rows(conn: &Connection, rows: &RowSet) -> Result<(), RemoteError> {
        for row in &rows.assets {
            conn.execute(
                "INSERT INTO assets (id, name, type, description, parent_id, owner, quality, modified, location, pinned, icon, revision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, type = excluded.type, description = excluded.description,
                    parent_id = excluded.parent_id, owner = excluded.owner, quality = excluded.quality,
                    modified = excluded.modified, location = excluded.location, pinned = excluded.pinned,
                    icon = excluded.icon, revision = excluded.revision",
                params![
                    row.id,
                    row.name,
                    row.asset_type,
                    row.description,
                    row.parent_id,
                    row.owner,
                    row.quality,
                    row.modified.map(|m| m.to_rfc3339()),
                    row.location,
                    row.pinned,
                    row.icon,
                    row.revision,
                ],
            )?;

            // Dependent rows are replaced wholesale.
            for table in [
                "connection_metadata",
                "pipeline_metadata",
                "asset_tags",
                "asset_collections",
            ] {
                conn.execute(
                    &format!("DELETE FROM {} WHERE asset_id = ?1", table),
                    params![row.id],
                )?;
            }
        }

        for m in &rows.connection_metadata {
            conn.execute(
                "INSERT INTO connection_metadata (asset_id, connection_type, host, port, database, username, schema,
                    account, warehouse, role, api_key, client_id, client_secret, account_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    m.asset_id,
                    m.connection_type,
                    m.host,
                    m.port,
                    m.database,
                    m.username,
                    m.schema,
                    m.account,
                    m.warehouse,
                    m.role,
                    m.api_key,
                    m.client_id,
                    m.client_secret,
                    m.account_id,
                ],
            )?;
        }
        for m in &rows.pipeline_metadata {
            conn.execute(
                "INSERT INTO pipeline_metadata (asset_id, source_connection_id, destination_connection_id,
                    selected_table_ids, description, workspace)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    m.asset_id,
                    m.source_connection_id,
                    m.destination_connection_id,
                    serde_json::to_string(&m.selected_table_ids)?,
                    m.description,
                    m.workspace,
                ],
            )?;
        }
        for t in &rows.asset_tags {
            conn.execute(
                "INSERT OR IGNORE INTO asset_tags (asset_id, tag) VALUES (?1, ?2)",
                params![t.asset_id, t.tag],
            )?;
        }
        for c in &rows.asset_collections {
            conn.execute(
                "INSERT OR IGNORE INTO asset_collections (asset_id, collection) VALUES (?1, ?2)",
                params![c.asset_id, c.collection],
            )?;
        }
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl RemoteCatalog for SqliteRemoteCatalog {
    async fn fetch_all(&self) -> Result<Vec<Asset>, RemoteError> {
        let rows = self.blocking(Self::read_rows).await?;
        Ok(rows.assemble())
    }

    async fn upsert(&self, asset: &Asset) -> Result<(), RemoteError> {
        let rows = RowSet::from_asset(asset);
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            Self::write_rows(&tx, &rows)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &AssetId) -> Result<(), RemoteError> {
        let id = id.clone();
        self.blocking(move |conn| {
            let changed = conn.execute("DELETE FROM assets WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(RemoteError::NotFound(id));
            }
            Ok(())
        })
        .await
    }
}
