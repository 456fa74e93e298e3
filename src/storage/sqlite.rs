use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::new_id;
use crate::storage::{ContainerInfo, DocumentStore};

/// SQLite-backed document store wrapping two `tokio_rusqlite::Connection`
/// instances (writer + reader) in WAL mode. The writer serializes writes
/// through `tokio_rusqlite`'s channel; reads never wait on it.
#[derive(Clone)]
pub struct SqliteStore {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open the store at the default path (`~/.kaizendw/kaizendw.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".kaizendw");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("kaizendw.db")).await
    }

    /// Open the store at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// Open an in-memory store (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory databases are per-connection, so reader and writer
        // must share one.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            let migrations = Migrations::new(vec![M::up(include_str!(
                "migrations/001_initial.sql"
            ))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Storage(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }
}

fn parent_key(parent_id: Option<&str>) -> String {
    parent_id.unwrap_or("").to_string()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn load(&self, container_id: &str, key: &str) -> Result<Option<Value>> {
        let container_id = container_id.to_string();
        let key = key.to_string();
        let body: Option<String> = self
            .reader
            .call(move |conn| {
                conn.query_row(
                    "SELECT body FROM documents WHERE container_id = ?1 AND key = ?2",
                    params![container_id, key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        match body {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, container_id: &str, key: &str, value: &Value) -> Result<()> {
        let container_id = container_id.to_string();
        let key = key.to_string();
        let body = value.to_string();
        let updated_at = Utc::now().to_rfc3339();
        self.writer
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO documents (container_id, key, body, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(container_id, key) DO UPDATE SET
                         body = excluded.body,
                         updated_at = excluded.updated_at",
                    params![container_id, key, body, updated_at],
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await?;
        Ok(())
    }

    async fn find_container(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>> {
        let name = name.to_string();
        let parent = parent_key(parent_id);
        let id = self
            .reader
            .call(move |conn| {
                conn.query_row(
                    "SELECT id FROM containers WHERE name = ?1 AND parent_id = ?2",
                    params![name, parent],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(id)
    }

    async fn ensure_container(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let name = name.to_string();
        let parent = parent_key(parent_id);
        let candidate_id = new_id();
        let created_at = Utc::now().to_rfc3339();
        let id = self
            .writer
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO containers (id, name, parent_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(name, parent_id) DO NOTHING",
                    params![candidate_id, name, parent, created_at],
                )?;
                conn.query_row(
                    "SELECT id FROM containers WHERE name = ?1 AND parent_id = ?2",
                    params![name, parent],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(id)
    }

    async fn list_containers(&self, parent_id: Option<&str>) -> Result<Vec<ContainerInfo>> {
        let parent = parent_key(parent_id);
        let containers = self
            .reader
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, parent_id FROM containers
                     WHERE parent_id = ?1 ORDER BY name",
                )?;
                let rows = stmt.query_map(params![parent], |row| {
                    let parent_id: String = row.get(2)?;
                    Ok(ContainerInfo {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        parent_id: (!parent_id.is_empty()).then_some(parent_id),
                    })
                })?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            })
            .await?;
        Ok(containers)
    }
}
