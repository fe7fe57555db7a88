//! New-title detection against the persisted history.
//!
//! The baseline is the store's latest push time (the most recent
//! `observed_at` ever written). A title counts as previously seen when a
//! record with the same dedupe key was observed within `lookback` of that
//! baseline. The window deliberately exceeds 24 hours so a late collection
//! cycle or day-boundary skew does not re-announce yesterday's titles.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use config::DetectorSettings;
use errors::{ConfigError, DetectError};
use storage::StorageManager;
use tracing::{debug, info, instrument};
use tw_core::NewTitle;

/// Which fields identify "the same title" across collection cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupeKey {
    /// Title text alone; the same headline from two sources is one title.
    Title,
    /// Title and source together; each source announces independently.
    #[default]
    TitleSource,
}

impl DedupeKey {
    fn key(self, title: &str, source: &str) -> (String, Option<String>) {
        match self {
            Self::Title => (title.to_string(), None),
            Self::TitleSource => (title.to_string(), Some(source.to_string())),
        }
    }
}

/// Detector tunables, resolved from [`DetectorSettings`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Rolling window measured back from the baseline.
    pub lookback: Duration,
    pub dedupe: DedupeKey,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(26),
            dedupe: DedupeKey::default(),
        }
    }
}

impl DetectorConfig {
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self, ConfigError> {
        let dedupe = match settings.dedupe.as_str() {
            "title" => DedupeKey::Title,
            "title_source" => DedupeKey::TitleSource,
            other => {
                return Err(ConfigError::InvalidParameter {
                    name: "detector.dedupe".to_string(),
                    value: other.to_string(),
                });
            }
        };
        Ok(Self {
            lookback: Duration::hours(settings.lookback_hours),
            dedupe,
        })
    }
}

/// Outcome of one detection cycle.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Candidates not seen within the window, in input order.
    pub new: Vec<NewTitle>,
    /// Candidates matching a record inside the window, in input order.
    pub repeats: Vec<NewTitle>,
    /// Baseline used for the window; `None` on a first run, where every
    /// candidate is new.
    pub baseline: Option<DateTime<Utc>>,
}

/// Compares incoming batches against the store's recent history.
pub struct IncrementalDetector {
    manager: Arc<StorageManager>,
    config: DetectorConfig,
}

impl IncrementalDetector {
    #[must_use]
    pub fn new(manager: Arc<StorageManager>, config: DetectorConfig) -> Self {
        Self { manager, config }
    }

    /// Detect against the current wall clock.
    pub async fn detect(&self, candidates: &[NewTitle]) -> Result<Detection, DetectError> {
        self.detect_at(Utc::now(), candidates).await
    }

    /// Detect with an explicit "now".
    ///
    /// Storage failures abort the cycle; guessing a baseline would
    /// misclassify every candidate.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn detect_at(
        &self,
        now: DateTime<Utc>,
        candidates: &[NewTitle],
    ) -> Result<Detection, DetectError> {
        let Some(baseline) = self.manager.latest_push_time().await? else {
            info!("Empty store, treating entire batch as new");
            return Ok(Detection {
                new: candidates.to_vec(),
                repeats: Vec::new(),
                baseline: None,
            });
        };

        let cutoff = baseline - self.config.lookback;

        // Today's and yesterday's partitions cover the whole window as long
        // as the lookback stays under 48 hours (enforced by configuration).
        let today = now.date_naive();
        let mut records = self.manager.read_by_date(today).await?;
        records.extend(self.manager.read_by_date(utils::previous_day(today)).await?);

        let seen: HashSet<(String, Option<String>)> = records
            .iter()
            .filter(|r| r.observed_at >= cutoff && r.observed_at <= baseline)
            .map(|r| self.config.dedupe.key(&r.title, &r.source))
            .collect();

        let mut new = Vec::new();
        let mut repeats = Vec::new();
        for candidate in candidates {
            let key = self.config.dedupe.key(&candidate.title, &candidate.source);
            if seen.contains(&key) {
                repeats.push(candidate.clone());
            } else {
                new.push(candidate.clone());
            }
        }

        debug!(
            %baseline,
            %cutoff,
            seen = seen.len(),
            new = new.len(),
            repeats = repeats.len(),
            "Detection cycle complete"
        );
        Ok(Detection {
            new,
            repeats,
            baseline: Some(baseline),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_map_to_dedupe_keys() {
        let config = DetectorConfig::from_settings(&DetectorSettings::default()).unwrap();
        assert_eq!(config.dedupe, DedupeKey::TitleSource);
        assert_eq!(config.lookback, Duration::hours(26));

        let config = DetectorConfig::from_settings(&DetectorSettings {
            dedupe: "title".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.dedupe, DedupeKey::Title);
    }

    #[test]
    fn unrecognized_dedupe_value_is_rejected() {
        let result = DetectorConfig::from_settings(&DetectorSettings {
            dedupe: "url".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name, value })
                if name == "detector.dedupe" && value == "url"
        ));
    }

    #[test]
    fn title_key_ignores_source() {
        assert_eq!(
            DedupeKey::Title.key("Alpha", "hn"),
            DedupeKey::Title.key("Alpha", "reddit")
        );
        assert_ne!(
            DedupeKey::TitleSource.key("Alpha", "hn"),
            DedupeKey::TitleSource.key("Alpha", "reddit")
        );
    }
}
