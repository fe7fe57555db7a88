//! Configuration-driven facade over the title store backends.
//!
//! The manager owns backend selection, one-time schema setup, and the
//! normalization step that keeps invalid records out of storage. Everything
//! downstream (the detector, callers ingesting collector output) talks to
//! this type and never to a concrete backend.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use config::StorageConfig;
use errors::{ConfigError, ManagerError, StorageError};
use tracing::{info, instrument, warn};
use tw_core::{
    NewTitle, RawTitle, SchemaKind, SkippedTitle, TitleRecord, TitleStore, WriteSummary,
};

use crate::local::LocalTitleStore;
use crate::remote::RemoteTitleStore;

/// Facade over whichever [`TitleStore`] the configuration selects.
///
/// Construction fails fast on an unknown backend kind or a missing remote
/// section; there is no silent fallback to the local store. The backing
/// connection is released when the last clone of the inner `Arc` drops.
pub struct StorageManager {
    store: Arc<dyn TitleStore>,
    schema: SchemaKind,
    backend_kind: String,
}

impl StorageManager {
    /// Select and initialize the configured backend, then run schema setup
    /// exactly once.
    #[instrument(skip(config), fields(backend = %config.backend, schema = ?schema))]
    pub async fn connect(
        config: &StorageConfig,
        schema: SchemaKind,
    ) -> Result<Self, ManagerError> {
        let store: Arc<dyn TitleStore> = match config.backend.as_str() {
            "local" => Arc::new(LocalTitleStore::new(&config.local, schema)?),
            "remote" => {
                let remote = config.remote.as_ref().ok_or(ConfigError::MissingParameter {
                    name: "remote".to_string(),
                })?;
                Arc::new(RemoteTitleStore::connect(remote, schema).await)
            }
            other => {
                return Err(ConfigError::UnknownBackend {
                    kind: other.to_string(),
                }
                .into());
            }
        };

        store.ensure_schema().await?;
        info!("Storage manager ready");

        Ok(Self {
            store,
            schema,
            backend_kind: config.backend.clone(),
        })
    }

    #[must_use]
    pub fn schema(&self) -> SchemaKind {
        self.schema
    }

    /// Configured backend kind, "local" or "remote".
    #[must_use]
    pub fn backend_kind(&self) -> &str {
        &self.backend_kind
    }

    /// Normalize, validate, and persist a batch of raw observations.
    ///
    /// Invalid records are dropped with their original batch index recorded
    /// in the summary; valid records from the same batch still commit. The
    /// backend only ever sees validated records.
    #[instrument(skip(self, batch), fields(records = batch.len()))]
    pub async fn write_batch(&self, batch: Vec<RawTitle>) -> Result<WriteSummary, StorageError> {
        let mut valid = Vec::with_capacity(batch.len());
        let mut skipped = Vec::new();
        for (index, raw) in batch.into_iter().enumerate() {
            match NewTitle::normalize(raw) {
                Ok(record) => valid.push(record),
                Err(reason) => {
                    warn!(index, %reason, "Dropping invalid record");
                    skipped.push(SkippedTitle { index, reason });
                }
            }
        }

        let mut summary = self.store.write_batch(&valid).await?;
        summary.skipped = skipped;
        Ok(summary)
    }

    /// Persist records that are already normalized and validated.
    pub async fn write_validated(
        &self,
        batch: &[NewTitle],
    ) -> Result<WriteSummary, StorageError> {
        self.store.write_batch(batch).await
    }

    /// All records observed on the given UTC date, ordered by `observed_at`.
    pub async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TitleRecord>, StorageError> {
        self.store.read_by_date(date).await
    }

    /// Most recent `observed_at` across the store; `None` on a fresh store.
    pub async fn latest_push_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.store.latest_push_time().await
    }
}
