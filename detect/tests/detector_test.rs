use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use config::StorageConfig;
use detect::{DedupeKey, DetectorConfig, IncrementalDetector};
use storage::StorageManager;
use tw_core::{NewTitle, SchemaKind};

fn title_at(title: &str, source: &str, at: DateTime<Utc>) -> NewTitle {
    NewTitle {
        title: title.to_string(),
        source: source.to_string(),
        category: None,
        rank: None,
        url: None,
        metadata: serde_json::Value::Null,
        observed_at: at,
    }
}

async fn memory_manager() -> Arc<StorageManager> {
    Arc::new(
        StorageManager::connect(&StorageConfig::default(), SchemaKind::News)
            .await
            .expect("Failed to connect in-memory manager"),
    )
}

fn titles(batch: &[NewTitle]) -> Vec<&str> {
    batch.iter().map(|t| t.title.as_str()).collect()
}

#[tokio::test]
async fn first_run_treats_everything_as_new() {
    let manager = memory_manager().await;
    let detector = IncrementalDetector::new(manager, DetectorConfig::default());

    let now = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let candidates = vec![
        title_at("Alpha", "hn", now),
        title_at("Beta", "hn", now),
    ];
    let detection = detector.detect_at(now, &candidates).await.unwrap();

    assert_eq!(titles(&detection.new), ["Alpha", "Beta"]);
    assert!(detection.repeats.is_empty());
    assert!(detection.baseline.is_none());
}

#[tokio::test]
async fn window_is_measured_back_from_the_baseline() {
    let manager = memory_manager().await;
    let now = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let baseline = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();

    // "Stale" sits in yesterday's partition but 27h before the baseline,
    // outside the 26h window; "Recent" at 25h back is inside it.
    manager
        .write_validated(&[
            title_at("Fresh", "hn", baseline),
            title_at("Recent", "hn", baseline - chrono::Duration::hours(25)),
            title_at("Stale", "hn", baseline - chrono::Duration::hours(27)),
        ])
        .await
        .unwrap();

    let detector = IncrementalDetector::new(manager, DetectorConfig::default());
    let candidates = vec![
        title_at("Fresh", "hn", now),
        title_at("Recent", "hn", now),
        title_at("Stale", "hn", now),
        title_at("Brand New", "hn", now),
    ];
    let detection = detector.detect_at(now, &candidates).await.unwrap();

    assert_eq!(titles(&detection.new), ["Stale", "Brand New"]);
    assert_eq!(titles(&detection.repeats), ["Fresh", "Recent"]);
    assert_eq!(detection.baseline, Some(baseline));
}

#[tokio::test]
async fn midnight_rollover_still_sees_yesterdays_titles() {
    let manager = memory_manager().await;

    // Alpha observed 23:50 yesterday; the latest push was 23:55. A cycle
    // shortly after midnight must treat Alpha as a repeat, not new.
    let alpha_at = Utc.with_ymd_and_hms(2025, 6, 2, 23, 50, 0).unwrap();
    let marker_at = Utc.with_ymd_and_hms(2025, 6, 2, 23, 55, 0).unwrap();
    manager
        .write_validated(&[
            title_at("Alpha", "hn", alpha_at),
            title_at("Marker", "hn", marker_at),
        ])
        .await
        .unwrap();

    let detector = IncrementalDetector::new(manager, DetectorConfig::default());
    let now = Utc.with_ymd_and_hms(2025, 6, 3, 0, 10, 0).unwrap();
    let candidates = vec![title_at("Alpha", "hn", now), title_at("Beta", "hn", now)];
    let detection = detector.detect_at(now, &candidates).await.unwrap();

    assert_eq!(titles(&detection.new), ["Beta"]);
    assert_eq!(titles(&detection.repeats), ["Alpha"]);
}

#[tokio::test]
async fn detection_does_not_modify_the_store() {
    let manager = memory_manager().await;
    let baseline = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
    manager
        .write_validated(&[title_at("Alpha", "hn", baseline)])
        .await
        .unwrap();

    let detector = IncrementalDetector::new(manager.clone(), DetectorConfig::default());
    let now = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let candidates = vec![title_at("Alpha", "hn", now), title_at("Beta", "hn", now)];

    let first = detector.detect_at(now, &candidates).await.unwrap();
    let second = detector.detect_at(now, &candidates).await.unwrap();

    assert_eq!(titles(&first.new), titles(&second.new));
    assert_eq!(titles(&first.repeats), titles(&second.repeats));
    assert_eq!(manager.latest_push_time().await.unwrap(), Some(baseline));
}

#[tokio::test]
async fn dedupe_by_title_merges_sources() {
    let manager = memory_manager().await;
    let baseline = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
    manager
        .write_validated(&[title_at("Alpha", "hn", baseline)])
        .await
        .unwrap();

    let now = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let candidates = vec![title_at("Alpha", "reddit", now)];

    let by_title = IncrementalDetector::new(
        manager.clone(),
        DetectorConfig {
            dedupe: DedupeKey::Title,
            ..Default::default()
        },
    );
    let detection = by_title.detect_at(now, &candidates).await.unwrap();
    assert!(detection.new.is_empty());
    assert_eq!(titles(&detection.repeats), ["Alpha"]);

    // Under the source-qualified key the same headline from a different
    // source is a distinct title.
    let by_title_source = IncrementalDetector::new(manager, DetectorConfig::default());
    let detection = by_title_source.detect_at(now, &candidates).await.unwrap();
    assert_eq!(titles(&detection.new), ["Alpha"]);
    assert!(detection.repeats.is_empty());
}

#[tokio::test]
async fn empty_candidate_batch_yields_empty_detection() {
    let manager = memory_manager().await;
    let baseline = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
    manager
        .write_validated(&[title_at("Alpha", "hn", baseline)])
        .await
        .unwrap();

    let detector = IncrementalDetector::new(manager, DetectorConfig::default());
    let now = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let detection = detector.detect_at(now, &[]).await.unwrap();

    assert!(detection.new.is_empty());
    assert!(detection.repeats.is_empty());
    assert_eq!(detection.baseline, Some(baseline));
}

#[tokio::test]
async fn detect_then_persist_marks_next_cycle_as_repeat() {
    let manager = memory_manager().await;
    let detector = IncrementalDetector::new(manager.clone(), DetectorConfig::default());

    let now = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let candidates = vec![title_at("Alpha", "hn", now)];

    let detection = detector.detect_at(now, &candidates).await.unwrap();
    assert_eq!(titles(&detection.new), ["Alpha"]);
    manager.write_validated(&detection.new).await.unwrap();

    let later = now + chrono::Duration::hours(1);
    let detection = detector
        .detect_at(later, &[title_at("Alpha", "hn", later)])
        .await
        .unwrap();
    assert!(detection.new.is_empty());
    assert_eq!(titles(&detection.repeats), ["Alpha"]);
    assert_eq!(detection.baseline, Some(now));
}
