//! Capability contract for title storage backends.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use errors::StorageError;

use crate::types::{NewTitle, TitleRecord, WriteSummary};

/// Storage backend contract.
///
/// Local (embedded database) and remote (object store) implementations are
/// interchangeable behind this trait; the variant is selected once at
/// manager construction, never branched on per call.
#[async_trait]
pub trait TitleStore: Send + Sync {
    /// Idempotent initialization: create tables/objects if absent. Safe to
    /// call on every startup; never destroys existing data.
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    /// Append all records under a single push batch.
    ///
    /// Atomic per backend semantics: concurrent readers never observe a
    /// partial batch.
    async fn write_batch(&self, batch: &[NewTitle]) -> Result<WriteSummary, StorageError>;

    /// All records observed on the given UTC date. Returns an empty vec, not
    /// an error, when no data exists for that date.
    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TitleRecord>, StorageError>;

    /// Maximum `observed_at` across all stored dates, or `None` when the
    /// store is empty or uninitialized.
    async fn latest_push_time(&self) -> Result<Option<DateTime<Utc>>, StorageError>;
}
