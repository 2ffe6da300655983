//! Removal of message units past their retention period.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{valid_user_message, TestEngine, PMODE_ID};
use ebms_core::models::Direction;
use ebms_core::pmode::ProcessingMode;
use ebms_core::purge::MessageUnitPurger;
use std::time::Duration;

#[tokio::test]
async fn test_units_before_cutoff_are_purged_with_event() {
    let engine = TestEngine::builder()
        .pmode(ProcessingMode::new(PMODE_ID))
        .build();
    engine
        .processor
        .submit(valid_user_message(Direction::Out, "old-1@example.com"))
        .await
        .unwrap();
    engine
        .processor
        .submit(valid_user_message(Direction::Out, "old-2@example.com"))
        .await
        .unwrap();

    let purger = MessageUnitPurger::new(engine.core.clone());
    let purged = purger
        .purge_older_than(Utc::now() + ChronoDuration::minutes(1))
        .await
        .unwrap();

    assert_eq!(purged, 2);
    assert!(engine.stored("old-1@example.com", Direction::Out).await.is_empty());
    assert!(engine.stored("old-2@example.com", Direction::Out).await.is_empty());
    assert_eq!(engine.events.count("MessageUnitPurged"), 2);
    assert_eq!(
        engine.events.events_for_message("old-1@example.com"),
        vec!["MessageUnitPurged"]
    );
}

#[tokio::test]
async fn test_recent_units_are_kept() {
    let engine = TestEngine::builder()
        .pmode(ProcessingMode::new(PMODE_ID))
        .build();
    engine
        .processor
        .submit(valid_user_message(Direction::Out, "fresh@example.com"))
        .await
        .unwrap();

    let purger = MessageUnitPurger::new(engine.core.clone());

    assert_eq!(purger.purge_expired().await.unwrap(), 0);
    assert_eq!(engine.stored("fresh@example.com", Direction::Out).await.len(), 1);
    assert_eq!(engine.events.count("MessageUnitPurged"), 0);
}

#[tokio::test]
async fn test_purging_twice_reports_missing_unit() {
    let engine = TestEngine::builder()
        .pmode(ProcessingMode::new(PMODE_ID))
        .build();
    let entity = engine
        .processor
        .submit(valid_user_message(Direction::Out, "gone@example.com"))
        .await
        .unwrap();

    let purger = MessageUnitPurger::new(engine.core.clone());
    assert!(purger.purge(&entity).await.unwrap());
    assert!(!purger.purge(&entity).await.unwrap());
}

#[tokio::test]
async fn test_background_purger_stops_on_shutdown() {
    let engine = TestEngine::builder().build();
    let purger = MessageUnitPurger::new(engine.core.clone());

    let handle = purger.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    purger.shutdown();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("purger stops")
        .unwrap();
}
