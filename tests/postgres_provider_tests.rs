//! PostgreSQL storage provider against a live database.
//!
//! Run with `DATABASE_URL` pointing at a scratch database and `--ignored`.
#![cfg(feature = "postgres")]

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::valid_user_message;
use ebms_core::models::{Direction, MessageUnitType};
use ebms_core::state_machine::ProcessingState;
use ebms_core::storage::{MessageUnitRegistry, PostgresStorageProvider};
use std::sync::Arc;

async fn registry(pool: sqlx::PgPool) -> MessageUnitRegistry {
    let provider = PostgresStorageProvider::new(pool);
    provider.migrate().await.unwrap();
    MessageUnitRegistry::new(Arc::new(provider))
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_store_and_reload_history(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry(pool).await;
    let mut entity = registry
        .store_received(valid_user_message(Direction::In, "pg-1@example.com"))
        .await
        .unwrap();
    registry
        .set_state(&mut entity, ProcessingState::Processing, Some("started"))
        .await
        .unwrap();
    registry.set_multi_hop(&mut entity, true).await.unwrap();

    let found = registry
        .find_by_message_id("pg-1@example.com", Some(Direction::In))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let stored = &found[0];
    assert_eq!(stored.unit(), entity.unit());
    assert!(stored.uses_multi_hop());
    // Timestamps lose sub-microsecond precision in the database
    let states = |e: &ebms_core::models::MessageUnitEntity| {
        e.processing_states()
            .iter()
            .map(|r| (r.sequence, r.state))
            .collect::<Vec<_>>()
    };
    assert_eq!(states(stored), states(&entity));
    assert_eq!(
        stored.current_record().description.as_deref(),
        Some("started")
    );
    Ok(())
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_conditional_change_with_stale_handle(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry(pool).await;
    let mut first = registry
        .store_outgoing(valid_user_message(Direction::Out, "pg-2@example.com"))
        .await
        .unwrap();
    let mut stale = first.clone();

    let applied = registry
        .set_state_if(
            &mut first,
            ProcessingState::Submitted,
            ProcessingState::ReadyToPush,
            None,
        )
        .await
        .unwrap();
    assert!(applied.is_applied());

    let lost = registry
        .set_state_if(
            &mut stale,
            ProcessingState::Submitted,
            ProcessingState::Failure,
            None,
        )
        .await
        .unwrap();
    assert!(!lost.is_applied());
    // The losing handle was refreshed to the persisted state
    assert_eq!(stale.current_state(), ProcessingState::ReadyToPush);
    Ok(())
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_claims_have_one_winner(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry(pool).await;
    let mut entity = registry
        .store_received(valid_user_message(Direction::In, "pg-3@example.com"))
        .await
        .unwrap();
    registry
        .set_state(&mut entity, ProcessingState::ReadyForDelivery, None)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let registry = registry.clone();
        let mut handle = entity.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .set_state_if(
                    &mut handle,
                    ProcessingState::ReadyForDelivery,
                    ProcessingState::OutForDelivery,
                    None,
                )
                .await
                .unwrap()
                .is_applied()
        }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    registry.reload(&mut entity).await.unwrap();
    assert_eq!(entity.state_log().count_of(ProcessingState::OutForDelivery), 1);
    Ok(())
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_queries_and_removal(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry(pool).await;
    let mut waiting = registry
        .store_outgoing(valid_user_message(Direction::Out, "pg-4@example.com"))
        .await
        .unwrap();
    registry
        .set_state(&mut waiting, ProcessingState::AwaitingReceipt, None)
        .await
        .unwrap();
    registry
        .store_outgoing(valid_user_message(Direction::Out, "pg-5@example.com"))
        .await
        .unwrap();

    let in_state = registry
        .find_in_state(MessageUnitType::UserMessage, ProcessingState::AwaitingReceipt)
        .await
        .unwrap();
    assert_eq!(in_state.len(), 1);
    assert_eq!(in_state[0].message_id(), "pg-4@example.com");

    let by_pmode = registry.find_by_pmode(common::PMODE_ID).await.unwrap();
    assert_eq!(by_pmode.len(), 2);

    let old = registry
        .find_changed_before(Utc::now() + ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert_eq!(old.len(), 2);

    assert!(registry.remove(&waiting).await.unwrap());
    assert!(!registry.remove(&waiting).await.unwrap());
    assert!(registry.get(waiting.internal_id()).await.unwrap().is_none());
    Ok(())
}
