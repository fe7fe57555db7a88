//! DuckDB-based title store.
//!
//! File-resident (or in-memory) implementation of the [`TitleStore`]
//! contract. One store instance is bound to one [`SchemaKind`]; the news and
//! RSS schemas are separate tables in the same database file.
//!
//! ## Thread safety
//! DuckDB supports single-writer semantics, so the connection sits behind a
//! `parking_lot::Mutex` and all operations serialize on it. Batches commit
//! inside one transaction, so readers never observe a partial batch.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use config::LocalConfig;
use duckdb::{Connection, params};
use errors::StorageError;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use tw_core::{NewTitle, PushBatchId, SchemaKind, TitleRecord, TitleStore, WriteSummary};
use uuid::Uuid;

const BACKEND: &str = "duckdb";

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// DuckDB-backed implementation of [`TitleStore`].
pub struct LocalTitleStore {
    conn: Arc<Mutex<Connection>>,
    schema: SchemaKind,
}

impl LocalTitleStore {
    /// Open (creating if absent) the database file and bind to one schema.
    ///
    /// Schema objects are not created here; the manager calls
    /// [`TitleStore::ensure_schema`] once at startup.
    #[instrument(skip(config), fields(path = %config.path))]
    pub fn new(config: &LocalConfig, schema: SchemaKind) -> Result<Self, StorageError> {
        info!("Opening local title store");

        let conn = if config.path == ":memory:" {
            Connection::open_in_memory().map_err(open_error)?
        } else {
            Connection::open(Path::new(&config.path)).map_err(open_error)?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
        })
    }

    fn initialize_schema(&self, conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMP DEFAULT (now()),
                description VARCHAR
            );
            ",
        )
        .map_err(db_error)?;

        let table = self.schema.table_name();
        conn.execute_batch(&format!(
            r"
            CREATE TABLE IF NOT EXISTS {table} (
                id VARCHAR PRIMARY KEY,
                title VARCHAR NOT NULL CHECK (length(trim(title)) > 0),
                source VARCHAR NOT NULL CHECK (length(trim(source)) > 0),
                category VARCHAR,
                rank INTEGER,
                url VARCHAR,
                metadata VARCHAR,
                observed_at VARCHAR NOT NULL,
                observed_date VARCHAR NOT NULL,
                push_batch_id BIGINT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(observed_date);
            CREATE INDEX IF NOT EXISTS idx_{table}_observed_at ON {table}(observed_at);
            ",
        ))
        .map_err(db_error)?;

        debug!(table, "Schema initialized");
        Ok(())
    }

    fn run_migrations(&self, conn: &Connection) -> Result<(), StorageError> {
        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            info!(
                "Running migrations from version {} to {}",
                current_version, SCHEMA_VERSION
            );

            if current_version < 1 {
                conn.execute(
                    "INSERT INTO schema_version (version, description) VALUES (1, 'Initial title schema')",
                    [],
                )
                .map_err(db_error)?;
            }
        } else {
            debug!("Schema is up to date (version {})", current_version);
        }

        Ok(())
    }
}

#[async_trait]
impl TitleStore for LocalTitleStore {
    #[instrument(skip(self))]
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        self.initialize_schema(&conn)?;
        self.run_migrations(&conn)?;
        Ok(())
    }

    #[instrument(skip(self, batch), fields(records = batch.len()))]
    async fn write_batch(&self, batch: &[NewTitle]) -> Result<WriteSummary, StorageError> {
        let batch_id = PushBatchId::from_time(Utc::now());
        if batch.is_empty() {
            return Ok(WriteSummary {
                batch_id,
                written: 0,
                skipped: Vec::new(),
            });
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_error)?;
        {
            let table = self.schema.table_name();
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {table}
                     (id, title, source, category, rank, url, metadata,
                      observed_at, observed_date, push_batch_id)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ))
                .map_err(db_error)?;

            for new in batch {
                let record = TitleRecord::assign(new.clone(), batch_id);
                stmt.execute(params![
                    record.id.to_string(),
                    record.title,
                    record.source,
                    record.category,
                    record.rank,
                    record.url,
                    serde_json::to_string(&record.metadata)
                        .map_err(|e| StorageError::permanent(BACKEND, e.to_string()))?,
                    timestamp_key(record.observed_at),
                    utils::date_key(record.observed_date()),
                    record.push_batch_id.as_i64(),
                ])
                .map_err(db_error)?;
            }
        }
        tx.commit().map_err(db_error)?;

        debug!(%batch_id, written = batch.len(), "Batch committed");
        Ok(WriteSummary {
            batch_id,
            written: batch.len(),
            skipped: Vec::new(),
        })
    }

    #[instrument(skip(self), fields(date = %date))]
    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TitleRecord>, StorageError> {
        let conn = self.conn.lock();
        let table = self.schema.table_name();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, title, source, category, rank, url, metadata,
                        observed_at, push_batch_id
                 FROM {table}
                 WHERE observed_date = ?
                 ORDER BY observed_at",
            ))
            .map_err(db_error)?;

        let rows = stmt
            .query_map(params![utils::date_key(date)], |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    category: row.get(3)?,
                    rank: row.get(4)?,
                    url: row.get(5)?,
                    metadata: row.get(6)?,
                    observed_at: row.get(7)?,
                    push_batch_id: row.get(8)?,
                })
            })
            .map_err(db_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_error)?.into_record()?);
        }

        debug!(count = records.len(), "Read date partition");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn latest_push_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let conn = self.conn.lock();
        let table = self.schema.table_name();

        // Single aggregate over the observed_at index; this runs on every
        // detection cycle.
        let max: Option<String> = conn
            .query_row(&format!("SELECT MAX(observed_at) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(db_error)?;

        max.map(|raw| parse_timestamp(&raw)).transpose()
    }
}

/// Intermediate row shape; column decoding happens inside the duckdb
/// callback, timestamp/uuid parsing outside it.
struct RawRow {
    id: String,
    title: String,
    source: String,
    category: Option<String>,
    rank: Option<i32>,
    url: Option<String>,
    metadata: Option<String>,
    observed_at: String,
    push_batch_id: i64,
}

impl RawRow {
    fn into_record(self) -> Result<TitleRecord, StorageError> {
        Ok(TitleRecord {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StorageError::permanent(BACKEND, format!("corrupt id: {e}")))?,
            title: self.title,
            source: self.source,
            category: self.category,
            rank: self.rank,
            url: self.url,
            metadata: self
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| StorageError::permanent(BACKEND, format!("corrupt metadata: {e}")))?
                .unwrap_or(serde_json::Value::Null),
            observed_at: parse_timestamp(&self.observed_at)?,
            push_batch_id: PushBatchId(self.push_batch_id),
        })
    }
}

/// Fixed-width RFC 3339 with UTC `Z` suffix; lexicographic order matches
/// chronological order, which the `MAX(observed_at)` aggregate relies on.
fn timestamp_key(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::permanent(BACKEND, format!("corrupt timestamp {raw:?}: {e}")))
}

fn open_error(err: duckdb::Error) -> StorageError {
    StorageError::permanent(BACKEND, format!("failed to open database: {err}"))
}

fn db_error(err: duckdb::Error) -> StorageError {
    let reason = err.to_string();
    // DuckDB surfaces writer contention and IO stalls as plain errors;
    // classify those as retry-eligible.
    let lowered = reason.to_lowercase();
    if lowered.contains("lock") || lowered.contains("timeout") || lowered.contains("busy") {
        StorageError::transient(BACKEND, reason)
    } else {
        StorageError::permanent(BACKEND, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn memory_store(schema: SchemaKind) -> LocalTitleStore {
        LocalTitleStore::new(&LocalConfig::default(), schema).expect("open in-memory store")
    }

    fn title(name: &str, at: DateTime<Utc>) -> NewTitle {
        NewTitle {
            title: name.to_string(),
            source: "hn".to_string(),
            category: None,
            rank: Some(1),
            url: None,
            metadata: serde_json::Value::Null,
            observed_at: at,
        }
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let store = memory_store(SchemaKind::News);
        store.ensure_schema().await.unwrap();

        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        store.write_batch(&[title("Alpha", at)]).await.unwrap();

        // Second run must not destroy existing data.
        store.ensure_schema().await.unwrap();
        let records = store.read_by_date(at.date_naive()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Alpha");
    }

    #[tokio::test]
    async fn news_and_rss_schemas_are_separate_stores() {
        let store = memory_store(SchemaKind::News);
        store.ensure_schema().await.unwrap();
        let rss = LocalTitleStore {
            conn: store.conn.clone(),
            schema: SchemaKind::Rss,
        };
        rss.ensure_schema().await.unwrap();

        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        store.write_batch(&[title("News Only", at)]).await.unwrap();

        assert_eq!(rss.read_by_date(at.date_naive()).await.unwrap().len(), 0);
        assert_eq!(store.read_by_date(at.date_naive()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let store = memory_store(SchemaKind::News);
        store.ensure_schema().await.unwrap();
        let summary = store.write_batch(&[]).await.unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(store.latest_push_time().await.unwrap(), None);
    }

    #[tokio::test]
    async fn timestamp_key_order_matches_chronology() {
        let earlier = Utc.with_ymd_and_hms(2025, 6, 1, 9, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert!(timestamp_key(earlier) < timestamp_key(later));
        assert_eq!(parse_timestamp(&timestamp_key(later)).unwrap(), later);
    }
}
