//! Embedded JSON document collection backed by SQLite.
//!
//! Documents are appended in chunks; each chunk commits in its own
//! transaction. A failing chunk stops the insert and everything committed
//! before it stays, which is what `InsertReport` reports back.

use crate::app::ports::{CollectionInspectPort, CollectionStats, DocumentSinkPort, InsertReport};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

struct Inner {
    location: Location,
    /// Opened on first use; a failed open is retried on the next call.
    conn: Mutex<Option<Connection>>,
    collection: String,
    batch_size: usize,
}

#[derive(Clone)]
pub struct SqliteDocumentStore {
    inner: Arc<Inner>,
}

impl SqliteDocumentStore {
    /// Open now, failing with `SinkUnavailable` if the database cannot be reached.
    pub fn open<P: AsRef<Path>>(db_path: P, collection: &str, batch_size: usize) -> Result<Self> {
        let store = Self::deferred(db_path, collection, batch_size);
        store.inner.with_conn(|_| Ok(()))?;
        Ok(store)
    }

    /// Defer opening until the first insert or query.
    pub fn deferred<P: AsRef<Path>>(db_path: P, collection: &str, batch_size: usize) -> Self {
        Self::with_location(Location::File(db_path.as_ref().to_path_buf()), collection, batch_size)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory(collection: &str, batch_size: usize) -> Result<Self> {
        let store = Self::with_location(Location::Memory, collection, batch_size);
        store.inner.with_conn(|_| Ok(()))?;
        Ok(store)
    }

    fn with_location(location: Location, collection: &str, batch_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                location,
                conn: Mutex::new(None),
                collection: collection.to_string(),
                batch_size: batch_size.max(1),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Run `f` on the blocking pool; SQLite calls never block the runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| EtlError::SinkUnavailable(format!("store task failed: {e}")))?
    }
}

impl Inner {
    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::Memory => Connection::open_in_memory().map_err(sink_err)?,
            Location::File(db_path) => {
                if let Some(parent) = db_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            EtlError::SinkUnavailable(format!("cannot create {}: {e}", parent.display()))
                        })?;
                    }
                }
                Connection::open(db_path).map_err(|e| {
                    EtlError::SinkUnavailable(format!("cannot open {}: {e}", db_path.display()))
                })?
            }
        };
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS documents (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT NOT NULL UNIQUE,
                collection   TEXT NOT NULL,
                body         TEXT NOT NULL,
                inserted_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);
            "#,
        )
        .map_err(sink_err)?;
        Ok(conn)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(EtlError::SinkUnavailable("connection not initialised".into())),
        }
    }

    fn insert_all(&self, documents: &[serde_json::Value]) -> Result<InsertReport> {
        self.with_conn(|conn| {
            let mut report = InsertReport { attempted: documents.len(), ..Default::default() };
            for chunk in documents.chunks(self.batch_size) {
                match insert_chunk(conn, &self.collection, chunk) {
                    Ok(()) => {
                        report.inserted += chunk.len();
                        debug!(collection = %self.collection, inserted = report.inserted, "Chunk committed");
                    }
                    Err(e) => {
                        warn!(
                            collection = %self.collection,
                            inserted = report.inserted,
                            attempted = report.attempted,
                            "Bulk insert stopped: {}",
                            e
                        );
                        report.error = Some(e.to_string());
                        break;
                    }
                }
            }
            Ok(report)
        })
    }

    fn stats(&self) -> Result<CollectionStats> {
        self.with_conn(|conn| {
            let (documents, data_bytes): (i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(LENGTH(body)), 0) FROM documents WHERE collection = ?1",
                    params![self.collection],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(sink_err)?;
            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0)).map_err(sink_err)?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0)).map_err(sink_err)?;
            Ok(CollectionStats {
                collection: self.collection.clone(),
                documents: documents as u64,
                data_bytes: data_bytes as u64,
                storage_bytes: (page_count * page_size) as u64,
            })
        })
    }

    fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    params![self.collection],
                    |row| row.get(0),
                )
                .map_err(sink_err)?;
            Ok(n as u64)
        })
    }

    fn sample(&self, limit: usize) -> Result<Vec<serde_json::Value>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq LIMIT ?2")
                .map_err(sink_err)?;
            let rows = stmt
                .query_map(params![self.collection, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(sink_err)?;

            let mut out = Vec::new();
            for row in rows {
                let (id, body) = row.map_err(sink_err)?;
                let mut doc: serde_json::Value = serde_json::from_str(&body)?;
                if let Some(obj) = doc.as_object_mut() {
                    obj.insert("_id".to_string(), serde_json::Value::String(id));
                }
                out.push(doc);
            }
            Ok(out)
        })
    }
}

fn insert_chunk(conn: &mut Connection, collection: &str, chunk: &[serde_json::Value]) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().timestamp();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO documents (id, collection, body, inserted_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for doc in chunk {
            let body = doc.to_string();
            stmt.execute(params![Uuid::new_v4().to_string(), collection, body, now])?;
        }
    }
    tx.commit()
}

fn sink_err(e: rusqlite::Error) -> EtlError {
    EtlError::SinkUnavailable(e.to_string())
}

#[async_trait]
impl DocumentSinkPort for SqliteDocumentStore {
    async fn insert_many(&self, documents: &[serde_json::Value]) -> Result<InsertReport> {
        let documents = documents.to_vec();
        self.blocking(move |inner| inner.insert_all(&documents)).await
    }
}

#[async_trait]
impl CollectionInspectPort for SqliteDocumentStore {
    async fn stats(&self) -> Result<CollectionStats> {
        self.blocking(|inner| inner.stats()).await
    }

    async fn count_documents(&self) -> Result<u64> {
        self.blocking(|inner| inner.count()).await
    }

    async fn sample(&self, limit: usize) -> Result<Vec<serde_json::Value>> {
        self.blocking(move |inner| inner.sample(limit)).await
    }
}
