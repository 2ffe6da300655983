//! Ordering guarantees of the processing state history, on the log itself and through the
//! registry.

mod common;

use common::valid_user_message;
use ebms_core::models::{Direction, MessageUnit, UserMessage};
use ebms_core::state_machine::{ProcessingState, ProcessingStateLog};
use ebms_core::storage::{InMemoryStorageProvider, MessageUnitRegistry};
use proptest::prelude::*;
use std::sync::Arc;

fn any_state() -> impl Strategy<Value = ProcessingState> {
    prop::sample::select(ProcessingState::ALL.to_vec())
}

proptest! {
    /// Property: every unconditional append lands at the end, in call order
    #[test]
    fn appends_keep_call_order(states in prop::collection::vec(any_state(), 1..40)) {
        let mut log = ProcessingStateLog::new(ProcessingState::Submitted, None);
        for state in &states {
            prop_assert!(log.try_append(None, *state, None).is_applied());
        }

        prop_assert_eq!(log.len(), states.len() + 1);
        let appended: Vec<_> = log.records()[1..].iter().map(|r| r.state).collect();
        prop_assert_eq!(&appended, &states);
        for pair in log.records().windows(2) {
            prop_assert!(pair[1].sequence > pair[0].sequence);
            prop_assert!(pair[1].start_time >= pair[0].start_time);
        }
        prop_assert_eq!(log.current_state(), *states.last().unwrap());
    }

    /// Property: a conditional append succeeds exactly when the expectation matches
    #[test]
    fn conditional_append_matches_current_state(
        initial in any_state(),
        expected in any_state(),
        next in any_state(),
    ) {
        let mut log = ProcessingStateLog::new(initial, None);
        let outcome = log.try_append(Some(expected), next, None);
        prop_assert_eq!(outcome.is_applied(), initial == expected);
        prop_assert_eq!(log.len(), if initial == expected { 2 } else { 1 });
    }

    /// Property: persisted histories round-trip and out-of-order records are refused
    #[test]
    fn history_serialization_preserves_order(states in prop::collection::vec(any_state(), 0..10)) {
        let mut log = ProcessingStateLog::new(ProcessingState::Received, None);
        for state in &states {
            log.try_append(None, *state, Some(format!("to {state}")));
        }
        let json = serde_json::to_string(&log).unwrap();
        let back: ProcessingStateLog = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &log);

        if log.len() > 1 {
            let mut records = log.records().to_vec();
            records.reverse();
            prop_assert!(ProcessingStateLog::from_records(records).is_err());
        }
    }
}

#[tokio::test]
async fn test_registry_appends_in_call_order() {
    let registry = MessageUnitRegistry::new(Arc::new(InMemoryStorageProvider::new()));
    let mut entity = registry
        .store_received(valid_user_message(Direction::In, "order@example.com"))
        .await
        .unwrap();

    let path = [
        ProcessingState::Processing,
        ProcessingState::ReadyForDelivery,
        ProcessingState::OutForDelivery,
        ProcessingState::Delivered,
    ];
    for state in path {
        registry.set_state(&mut entity, state, None).await.unwrap();
    }

    let stored = registry.get(entity.internal_id()).await.unwrap().unwrap();
    let states: Vec<_> = stored.processing_states().iter().map(|r| r.state).collect();
    assert_eq!(states[0], ProcessingState::Received);
    assert_eq!(&states[1..], &path);
    assert_eq!(stored.processing_states(), entity.processing_states());
    for pair in stored.processing_states().windows(2) {
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
        assert!(pair[1].start_time >= pair[0].start_time);
    }
}

#[tokio::test]
async fn test_outgoing_unit_is_submitted_with_single_record() {
    let registry = MessageUnitRegistry::new(Arc::new(InMemoryStorageProvider::new()));
    registry
        .store_outgoing(MessageUnit::user_message(
            Direction::Out,
            "new@example.com",
            UserMessage::default(),
        ))
        .await
        .unwrap();

    let found = registry
        .find_by_message_id("new@example.com", Some(Direction::Out))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].current_state(), ProcessingState::Submitted);
    assert_eq!(found[0].processing_states().len(), 1);

    let incoming = registry
        .find_by_message_id("new@example.com", Some(Direction::In))
        .await
        .unwrap();
    assert!(incoming.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_one_concurrent_claim_wins() {
    let registry = MessageUnitRegistry::new(Arc::new(InMemoryStorageProvider::new()));
    let mut entity = registry
        .store_received(valid_user_message(Direction::In, "claim@example.com"))
        .await
        .unwrap();
    registry
        .set_state(&mut entity, ProcessingState::ReadyForDelivery, None)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
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

    let stored = registry.get(entity.internal_id()).await.unwrap().unwrap();
    assert_eq!(stored.current_state(), ProcessingState::OutForDelivery);
    assert_eq!(
        stored
            .state_log()
            .count_of(ProcessingState::OutForDelivery),
        1
    );
}
