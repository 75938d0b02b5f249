//! Volatile event store.

use balance_core::event::{EventData, RecordedEvent};
use balance_core::event_store::{EventStore, EventStoreError, EventSubscription, ReadSlice};
use balance_core::stream::{ExpectedVersion, StreamCursor, StreamId, Version};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::log::Log;

/// In-memory event store.
///
/// Follows the same append, read and subscription rules as
/// [`FileEventStore`](crate::FileEventStore) but keeps nothing across
/// restarts. Cloning yields another handle to the same log.
///
/// # Example
///
/// ```
/// use balance_core::event::{EventData, EventKind};
/// use balance_core::event_store::EventStore;
/// use balance_core::stream::{ExpectedVersion, StreamId, Version};
/// use balance_store::InMemoryEventStore;
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = InMemoryEventStore::new();
/// let position = store
///     .append_to_stream(
///         StreamId::new("account"),
///         ExpectedVersion::Any,
///         vec![EventData::balance(EventKind::Credit, 10).unwrap()],
///     )
///     .await
///     .unwrap();
/// assert_eq!(position, Version::FIRST);
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<Log>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Log::new(Vec::new(), None),
        }
    }

    /// Create a store pre-loaded with `events`, e.g. to replay a fixture.
    ///
    /// Events are kept in the given order. Positions are renumbered per
    /// stream from 0, so fixtures need not get them right.
    #[must_use]
    pub fn with_events(events: Vec<RecordedEvent>) -> Self {
        let mut next: HashMap<StreamId, Version> = HashMap::new();
        let events = events
            .into_iter()
            .map(|mut event| {
                let position = next.entry(event.stream_id.clone()).or_insert(Version::FIRST);
                event.position = *position;
                *position = position.next();
                event
            })
            .collect();

        Self {
            log: Log::new(events, None),
        }
    }

    /// Drop every open subscription, as a lost connection would.
    ///
    /// Subscribers see `Err(SubscriptionDropped)` and may subscribe again.
    pub fn disconnect_subscribers(&self) {
        self.log.disconnect_subscribers();
    }

    /// Refuse all further requests.
    pub fn close(&self) {
        self.log.close();
    }

    /// Current version of `stream_id`, `None` if the stream is empty.
    pub async fn stream_version(&self, stream_id: &StreamId) -> Option<Version> {
        self.log.stream_version(stream_id).await
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_to_stream(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.log.append(stream_id, expected, events).await })
    }

    fn read_forward(
        &self,
        stream_id: StreamId,
        from: Version,
        max_count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ReadSlice, EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.log.read_forward(&stream_id, from, max_count).await })
    }

    fn read_backward(
        &self,
        stream_id: StreamId,
        from: StreamCursor,
        max_count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ReadSlice, EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.log.read_backward(&stream_id, from, max_count).await })
    }

    fn read_event(
        &self,
        stream_id: StreamId,
        position: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RecordedEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.log.read_event(&stream_id, position).await })
    }

    fn subscribe_from(
        &self,
        stream_id: StreamId,
        after: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<EventSubscription, EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.log.subscribe(stream_id, after) })
    }

    fn ensure_ready(&self) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move { self.log.ensure_ready() })
    }
}
