//! S3-backed title store.
//!
//! Same [`TitleStore`] contract as the local backend, over a network. The
//! physical layout under `{prefix}/{schema}/` is:
//!
//! - `manifest.json` — index object: latest push time, latest batch id, and
//!   the map of date -> batch object keys
//! - `{date}/batch-{push_batch_id}.json` — immutable batch objects
//!
//! Writes never mutate an object in place: a batch lands at a fresh key
//! first, then the manifest is replaced. A crash between the two leaves the
//! previous manifest (and all previously visible state) readable; the
//! orphan batch object is simply never referenced.
//!
//! Concurrent writers doing manifest read-modify-write can lose updates;
//! callers serialize `write_batch`, matching the single-writer-per-batch
//! discipline.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, timeout::TimeoutConfig};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, NaiveDate, Utc};
use config::RemoteConfig;
use errors::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_retry::{RetryIf, strategy::ExponentialBackoff};
use tracing::{debug, info, instrument, warn};
use tw_core::{NewTitle, PushBatchId, SchemaKind, TitleRecord, TitleStore, WriteSummary};

const BACKEND: &str = "s3";

const MANIFEST_VERSION: u32 = 1;

/// Base delay for exponential backoff on transient failures.
const RETRY_BASE_MS: u64 = 100;

/// Index object maintained alongside the batch objects.
///
/// Holding the latest push time here keeps `latest_push_time` to a single
/// small download instead of a walk over the object history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    latest_push_time: Option<DateTime<Utc>>,
    latest_batch: Option<PushBatchId>,
    #[serde(default)]
    days: BTreeMap<String, Vec<String>>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            latest_push_time: None,
            latest_batch: None,
            days: BTreeMap::new(),
        }
    }
}

impl Manifest {
    fn record_batch(
        &mut self,
        date: NaiveDate,
        object_key: String,
        batch_id: PushBatchId,
        max_observed: DateTime<Utc>,
    ) {
        self.days.entry(utils::date_key(date)).or_default().push(object_key);
        self.latest_batch = Some(self.latest_batch.map_or(batch_id, |b| b.max(batch_id)));
        self.latest_push_time = Some(
            self.latest_push_time
                .map_or(max_observed, |t| t.max(max_observed)),
        );
    }

    fn keys_for(&self, date: NaiveDate) -> &[String] {
        self.days
            .get(&utils::date_key(date))
            .map_or(&[], Vec::as_slice)
    }
}

/// S3-backed implementation of [`TitleStore`].
pub struct RemoteTitleStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    schema: SchemaKind,
    max_retries: u32,
}

impl RemoteTitleStore {
    /// Build the S3 client from the remote configuration. Supports custom
    /// endpoints (MinIO) via `endpoint` + `force_path_style`.
    #[instrument(skip(config), fields(bucket = %config.bucket))]
    pub async fn connect(config: &RemoteConfig, schema: SchemaKind) -> Self {
        info!("Connecting remote title store");

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_secs))
                    .build(),
            );
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            schema,
            max_retries: config.max_retries,
        }
    }

    fn root(&self) -> String {
        format!("{}/{}", self.prefix, self.schema.key_segment())
    }

    fn manifest_key(&self) -> String {
        format!("{}/manifest.json", self.root())
    }

    fn batch_key(&self, date: NaiveDate, batch_id: PushBatchId) -> String {
        format!(
            "{}/{}/batch-{}.json",
            self.root(),
            utils::date_key(date),
            batch_id
        )
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(RETRY_BASE_MS).take(self.max_retries as usize)
    }

    /// GET an object with bounded retry. `Ok(None)` when the key is absent.
    async fn get_bytes(&self, key: &str) -> Result<Option<bytes::Bytes>, StorageError> {
        let attempt = || async {
            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify_sdk(&e, key))?;
            let data = resp
                .body
                .collect()
                .await
                .map_err(|e| StorageError::transient(BACKEND, e.to_string()))?;
            Ok::<_, StorageError>(data.into_bytes())
        };

        match RetryIf::spawn(self.backoff(), attempt, StorageError::is_transient).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// PUT an object with bounded retry. A PUT at a fresh key is atomic from
    /// the reader's perspective.
    async fn put_bytes(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let attempt = || async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body.clone()))
                .send()
                .await
                .map_err(|e| classify_sdk(&e, key))?;
            Ok::<_, StorageError>(())
        };

        RetryIf::spawn(self.backoff(), attempt, StorageError::is_transient).await
    }

    /// Fetched at most once per operation; never cached across operations,
    /// so restarts and other writers are always observed.
    async fn get_manifest(&self) -> Result<Option<Manifest>, StorageError> {
        let key = self.manifest_key();
        match self.get_bytes(&key).await? {
            Some(bytes) => {
                let manifest = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::permanent(BACKEND, format!("corrupt manifest {key}: {e}"))
                })?;
                Ok(Some(manifest))
            }
            None => Ok(None),
        }
    }

    async fn put_manifest(&self, manifest: &Manifest) -> Result<(), StorageError> {
        let body = serde_json::to_vec(manifest)
            .map_err(|e| StorageError::permanent(BACKEND, e.to_string()))?;
        self.put_bytes(&self.manifest_key(), body).await
    }
}

#[async_trait]
impl TitleStore for RemoteTitleStore {
    #[instrument(skip(self))]
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        if self.get_manifest().await?.is_none() {
            info!("No manifest found, initializing remote store");
            self.put_manifest(&Manifest::default()).await?;
        }
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

        let mut by_date: BTreeMap<NaiveDate, Vec<TitleRecord>> = BTreeMap::new();
        for new in batch {
            let record = TitleRecord::assign(new.clone(), batch_id);
            by_date.entry(record.observed_date()).or_default().push(record);
        }

        // Batch objects first, manifest last: until the manifest PUT lands,
        // readers keep seeing the previous state in full.
        let mut written_groups = Vec::with_capacity(by_date.len());
        for (date, records) in &by_date {
            let key = self.batch_key(*date, batch_id);
            let body = serde_json::to_vec(records)
                .map_err(|e| StorageError::permanent(BACKEND, e.to_string()))?;
            self.put_bytes(&key, body).await?;

            let max_observed = records
                .iter()
                .map(|r| r.observed_at)
                .max()
                .unwrap_or_else(Utc::now);
            written_groups.push((*date, key, max_observed));
        }

        let mut manifest = self.get_manifest().await?.unwrap_or_default();
        for (date, key, max_observed) in written_groups {
            manifest.record_batch(date, key, batch_id, max_observed);
        }
        self.put_manifest(&manifest).await?;

        debug!(%batch_id, written = batch.len(), "Batch committed");
        Ok(WriteSummary {
            batch_id,
            written: batch.len(),
            skipped: Vec::new(),
        })
    }

    #[instrument(skip(self), fields(date = %date))]
    async fn read_by_date(&self, date: NaiveDate) -> Result<Vec<TitleRecord>, StorageError> {
        let Some(manifest) = self.get_manifest().await? else {
            // Uninitialized store reads as empty, same as a missing local file.
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for key in manifest.keys_for(date) {
            match self.get_bytes(key).await? {
                Some(bytes) => {
                    let batch: Vec<TitleRecord> = serde_json::from_slice(&bytes).map_err(|e| {
                        StorageError::permanent(BACKEND, format!("corrupt batch {key}: {e}"))
                    })?;
                    records.extend(batch);
                }
                None => warn!(key, "batch object listed in manifest is missing"),
            }
        }

        records.sort_by_key(|r| r.observed_at);
        debug!(count = records.len(), "Read date partition");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn latest_push_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        if let Some(manifest) = self.get_manifest().await? {
            return Ok(manifest.latest_push_time);
        }

        // Slow path: no manifest, reduce over the batch keys themselves.
        warn!("Manifest missing, listing batch objects to recover latest push time");
        let prefix = format!("{}/", self.root());
        let mut max_batch: Option<i64> = None;
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify_sdk(&e, &prefix))?;
            for object in page.contents() {
                if let Some(id) = object.key().and_then(parse_batch_key) {
                    max_batch = Some(max_batch.map_or(id, |m| m.max(id)));
                }
            }
        }

        Ok(max_batch.and_then(DateTime::from_timestamp_millis))
    }
}

/// Extract the push batch id from a `.../batch-{millis}.json` key.
fn parse_batch_key(key: &str) -> Option<i64> {
    key.rsplit('/')
        .next()?
        .strip_prefix("batch-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Translate an SDK error into the shared taxonomy.
///
/// Timeouts, dispatch and response failures are retry-eligible; service
/// errors are classified by code so that throttling retries while auth and
/// bucket misconfiguration surface immediately.
fn classify_sdk<E, R>(err: &SdkError<E, R>, key: &str) -> StorageError
where
    E: ProvideErrorMetadata,
{
    let code = err.meta().code().map(str::to_owned);
    let message = err.meta().message().map(str::to_owned);
    let reason = match (&code, &message) {
        (Some(c), Some(m)) => format!("{c}: {m}"),
        (Some(c), None) => c.clone(),
        (None, Some(m)) => m.clone(),
        (None, None) => format!("request for {key} failed"),
    };

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::transient(BACKEND, reason)
        }
        SdkError::ServiceError(_) => match code.as_deref() {
            Some("NoSuchKey" | "NotFound") => StorageError::not_found(BACKEND, key),
            Some(
                "SlowDown" | "Throttling" | "ThrottlingException" | "RequestTimeout"
                | "RequestTimeoutException" | "InternalError" | "ServiceUnavailable",
            ) => StorageError::transient(BACKEND, reason),
            _ => StorageError::permanent(BACKEND, reason),
        },
        _ => StorageError::permanent(BACKEND, reason),
    }
}
