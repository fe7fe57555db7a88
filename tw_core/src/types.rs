//! Record model for observed titles.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use errors::ValidationError;
use serde::{Deserialize, Serialize};
use utils::collapse_whitespace;
use uuid::Uuid;

/// Selects one of the two logical stores.
///
/// General news titles and RSS titles live in separate physical schemas; a
/// store instance is bound to exactly one kind at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    News,
    Rss,
}

impl SchemaKind {
    /// Table name used by the local backend.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::News => "news_titles",
            Self::Rss => "rss_titles",
        }
    }

    /// Key segment used by the remote backend.
    #[must_use]
    pub fn key_segment(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Rss => "rss",
        }
    }
}

/// Identifier of the push/collection cycle that produced a batch of records.
///
/// Derived from the batch wall-clock (milliseconds since epoch), so it is
/// monotonic per writer and sortable across backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PushBatchId(pub i64);

impl PushBatchId {
    #[must_use]
    pub fn from_time(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for PushBatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An unvalidated observation as delivered by a collector.
///
/// Timestamps may carry any offset; `title` and `source` may contain stray
/// whitespace. [`NewTitle::normalize`] turns this into a persistable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTitle {
    pub title: String,
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub rank: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub observed_at: Option<DateTime<FixedOffset>>,
}

/// A normalized, validated observation ready to persist (no id yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTitle {
    pub title: String,
    pub source: String,
    pub category: Option<String>,
    pub rank: Option<i32>,
    pub url: Option<String>,
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl NewTitle {
    /// Normalize a raw observation: trim and collapse whitespace in `title`
    /// and `source`, convert the timestamp to UTC, then validate.
    pub fn normalize(raw: RawTitle) -> Result<Self, ValidationError> {
        let observed_at = raw
            .observed_at
            .ok_or(ValidationError::MissingTimestamp)?
            .with_timezone(&Utc);

        let record = Self {
            title: collapse_whitespace(&raw.title),
            source: collapse_whitespace(&raw.source),
            category: raw.category.map(|c| collapse_whitespace(&c)),
            rank: raw.rank,
            url: raw.url,
            metadata: raw.metadata,
            observed_at,
        };
        record.validate()?;
        Ok(record)
    }

    /// Reject records that would be meaningless in storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        Ok(())
    }

    /// UTC calendar date this observation partitions into.
    #[must_use]
    pub fn observed_date(&self) -> NaiveDate {
        self.observed_at.date_naive()
    }
}

/// One persisted title observation. Immutable after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRecord {
    /// Backend-assigned surrogate identifier, stable once assigned.
    pub id: Uuid,
    pub title: String,
    pub source: String,
    pub category: Option<String>,
    pub rank: Option<i32>,
    pub url: Option<String>,
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
    pub push_batch_id: PushBatchId,
}

impl TitleRecord {
    /// Materialize a validated observation under a push batch, assigning the
    /// surrogate id.
    #[must_use]
    pub fn assign(new: NewTitle, batch_id: PushBatchId) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            source: new.source,
            category: new.category,
            rank: new.rank,
            url: new.url,
            metadata: new.metadata,
            observed_at: new.observed_at,
            push_batch_id: batch_id,
        }
    }

    #[must_use]
    pub fn observed_date(&self) -> NaiveDate {
        self.observed_at.date_naive()
    }
}

/// A record dropped by validation before reaching the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTitle {
    /// Index into the caller's original batch.
    pub index: usize,
    pub reason: ValidationError,
}

/// Result of a batch write.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub batch_id: PushBatchId,
    /// Number of records the backend committed.
    pub written: usize,
    /// Records rejected by validation; never sent to the backend.
    pub skipped: Vec<SkippedTitle>,
}
