//! Behavior shared by both event stores: concurrency checks, paging reads and
//! catch-up subscriptions. File persistence is covered at the end.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use balance_core::event::{EventData, EventKind};
use balance_core::event_store::{EventStore, EventStoreError, SubscriptionMessage};
use balance_core::stream::{ExpectedVersion, StreamCursor, StreamId, Version};
use balance_store::{FileEventStore, InMemoryEventStore};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn account() -> StreamId {
    StreamId::new("account-balance")
}

fn credit(amount: i64) -> EventData {
    EventData::balance(EventKind::Credit, amount).expect("payload encodes")
}

fn debit(amount: i64) -> EventData {
    EventData::balance(EventKind::Debit, amount).expect("payload encodes")
}

async fn seed(store: &dyn EventStore, amounts: &[i64]) {
    for amount in amounts {
        store
            .append_to_stream(account(), ExpectedVersion::Any, vec![credit(*amount)])
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn exact_expectation_must_match_last_position() {
    let store = InMemoryEventStore::new();
    seed(&store, &[100]).await;

    let stale = store
        .append_to_stream(
            account(),
            ExpectedVersion::Exact(Version::new(5)),
            vec![debit(30)],
        )
        .await;
    assert_eq!(
        stale,
        Err(EventStoreError::ConcurrencyConflict {
            stream_id: account(),
            expected: ExpectedVersion::Exact(Version::new(5)),
            actual: Some(Version::FIRST),
        })
    );

    let fresh = store
        .append_to_stream(account(), ExpectedVersion::Exact(Version::FIRST), vec![debit(30)])
        .await;
    assert_eq!(fresh, Ok(Version::new(1)));
}

#[tokio::test]
async fn no_stream_expectation_fails_once_stream_exists() {
    let store = InMemoryEventStore::new();
    seed(&store, &[1]).await;

    let result = store
        .append_to_stream(account(), ExpectedVersion::NoStream, vec![credit(2)])
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { actual: Some(_), .. })
    ));
}

#[tokio::test]
async fn batch_append_assigns_contiguous_positions() {
    let store = InMemoryEventStore::new();
    seed(&store, &[1]).await;

    let last = store
        .append_to_stream(account(), ExpectedVersion::Any, vec![credit(2), debit(3), credit(4)])
        .await
        .unwrap();
    assert_eq!(last, Version::new(3));

    let slice = store.read_forward(account(), Version::FIRST, 10).await.unwrap();
    let positions: Vec<u64> = slice.events.iter().map(|e| e.position.value()).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn concurrent_appends_with_same_expectation_one_wins() {
    let store = Arc::new(InMemoryEventStore::new());
    seed(store.as_ref(), &[100]).await;

    let first = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .append_to_stream(account(), ExpectedVersion::Exact(Version::FIRST), vec![credit(1)])
                .await
        })
    };
    let second = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .append_to_stream(account(), ExpectedVersion::Exact(Version::FIRST), vec![credit(2)])
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EventStoreError::ConcurrencyConflict { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(store.stream_version(&account()).await, Some(Version::new(1)));
}

#[tokio::test]
async fn forward_reads_page_through_the_stream() {
    let store = InMemoryEventStore::new();
    seed(&store, &[1, 2, 3, 4, 5]).await;

    let first = store.read_forward(account(), Version::FIRST, 2).await.unwrap();
    assert_eq!(first.events.len(), 2);
    assert_eq!(first.next_position, Some(Version::new(2)));
    assert!(!first.is_end_of_stream);

    let last = store.read_forward(account(), Version::new(4), 2).await.unwrap();
    assert_eq!(last.events.len(), 1);
    assert_eq!(last.next_position, Some(Version::new(5)));
    assert!(last.is_end_of_stream);
}

#[tokio::test]
async fn backward_reads_start_from_the_end() {
    let store = InMemoryEventStore::new();
    seed(&store, &[1, 2, 3]).await;

    let slice = store.read_backward(account(), StreamCursor::End, 2).await.unwrap();
    let amounts: Vec<i64> = slice.events.iter().map(|e| e.amount().unwrap()).collect();
    assert_eq!(amounts, vec![3, 2]);
    assert_eq!(slice.next_position, Some(Version::FIRST));
    assert!(!slice.is_end_of_stream);

    let rest = store
        .read_backward(account(), StreamCursor::At(Version::FIRST), 2)
        .await
        .unwrap();
    assert_eq!(rest.events.len(), 1);
    assert!(rest.is_end_of_stream);
}

#[tokio::test]
async fn reads_of_missing_stream_are_empty() {
    let store = InMemoryEventStore::new();

    let forward = store.read_forward(account(), Version::FIRST, 20).await.unwrap();
    assert!(forward.events.is_empty());
    assert!(forward.is_end_of_stream);

    let backward = store.read_backward(account(), StreamCursor::End, 20).await.unwrap();
    assert!(backward.events.is_empty());
    assert!(backward.is_end_of_stream);

    assert_eq!(store.read_event(account(), Version::FIRST).await, Ok(None));
}

#[tokio::test]
async fn read_event_finds_by_position() {
    let store = InMemoryEventStore::new();
    seed(&store, &[10, 20]).await;

    let event = store.read_event(account(), Version::new(1)).await.unwrap().unwrap();
    assert_eq!(event.amount(), Ok(20));
    assert_eq!(store.read_event(account(), Version::new(2)).await, Ok(None));
}

#[tokio::test]
async fn subscription_delivers_history_then_caught_up_then_live() {
    let store = InMemoryEventStore::new();
    seed(&store, &[1, 2, 3]).await;

    let mut feed = store
        .subscribe_from(account(), Some(Version::FIRST))
        .await
        .unwrap();

    for expected in [1_u64, 2] {
        match feed.next().await {
            Some(Ok(SubscriptionMessage::Event(event))) => {
                assert_eq!(event.position, Version::new(expected));
            }
            other => panic!("expected event {expected}, got {other:?}"),
        }
    }
    assert_eq!(feed.next().await, Some(Ok(SubscriptionMessage::CaughtUp)));

    store
        .append_to_stream(account(), ExpectedVersion::Any, vec![debit(4)])
        .await
        .unwrap();

    let live = tokio::time::timeout(Duration::from_secs(1), feed.next())
        .await
        .expect("live event arrives");
    match live {
        Some(Ok(SubscriptionMessage::Event(event))) => {
            assert_eq!(event.position, Version::new(3));
            assert_eq!(event.event_type, "DEBIT");
        }
        other => panic!("expected live event, got {other:?}"),
    }
}

#[tokio::test]
async fn subscription_ignores_other_streams() {
    let store = InMemoryEventStore::new();
    let mut feed = store.subscribe_from(account(), None).await.unwrap();
    assert_eq!(feed.next().await, Some(Ok(SubscriptionMessage::CaughtUp)));

    store
        .append_to_stream(StreamId::new("other"), ExpectedVersion::Any, vec![credit(9)])
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(50), feed.next()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn disconnect_drops_open_subscriptions() {
    let store = InMemoryEventStore::new();
    let mut feed = store.subscribe_from(account(), None).await.unwrap();
    assert_eq!(feed.next().await, Some(Ok(SubscriptionMessage::CaughtUp)));

    store.disconnect_subscribers();

    let dropped = tokio::time::timeout(Duration::from_secs(1), feed.next())
        .await
        .expect("drop is reported");
    assert!(matches!(dropped, Some(Err(_))));
    assert_eq!(feed.next().await, None);

    // A fresh subscription works after the disconnect.
    let mut again = store.subscribe_from(account(), None).await.unwrap();
    assert_eq!(again.next().await, Some(Ok(SubscriptionMessage::CaughtUp)));
}

#[tokio::test]
async fn file_store_keeps_events_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("events.jsonl");

    {
        let store = FileEventStore::open(&path).await.unwrap();
        store
            .append_to_stream(account(), ExpectedVersion::NoStream, vec![credit(100)])
            .await
            .unwrap();
        store
            .append_to_stream(account(), ExpectedVersion::Exact(Version::FIRST), vec![debit(30)])
            .await
            .unwrap();
    }

    let reopened = FileEventStore::open(&path).await.unwrap();
    assert_eq!(reopened.path(), path.as_path());

    let slice = reopened.read_forward(account(), Version::FIRST, 20).await.unwrap();
    let types: Vec<&str> = slice.events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["CREDIT", "DEBIT"]);

    let next = reopened
        .append_to_stream(account(), ExpectedVersion::Exact(Version::new(1)), vec![credit(5)])
        .await;
    assert_eq!(next, Ok(Version::new(2)));
}

#[tokio::test]
async fn file_store_cuts_off_torn_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    {
        let store = FileEventStore::open(&path).await.unwrap();
        seed(&store, &[7]).await;
    }

    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("{\"stream_id\":\"account-bal");
    std::fs::write(&path, contents).unwrap();

    let store = FileEventStore::open(&path).await.unwrap();
    let last = store
        .append_to_stream(account(), ExpectedVersion::Exact(Version::FIRST), vec![credit(8)])
        .await
        .unwrap();
    assert_eq!(last, Version::new(1));

    let reopened = FileEventStore::open(&path).await.unwrap();
    let slice = reopened.read_forward(account(), Version::FIRST, 20).await.unwrap();
    assert_eq!(slice.events.len(), 2);
}

#[tokio::test]
async fn file_store_rejects_corrupt_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, "not an event\n").unwrap();

    let result = FileEventStore::open(&path).await;

    assert!(matches!(result, Err(EventStoreError::Serialization(_))));
}
