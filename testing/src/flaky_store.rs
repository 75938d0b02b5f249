//! An event store wrapper that fails on demand.

use async_stream::stream;
use balance_core::event::{EventData, RecordedEvent};
use balance_core::event_store::{
    EventStore, EventStoreError, EventSubscription, ReadSlice, SubscriptionDropped,
};
use balance_core::stream::{ExpectedVersion, StreamCursor, StreamId, Version};
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

/// Decrement `counter` if positive. Returns whether it was.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Wraps a real store and injects readiness failures, subscribe failures and
/// subscription drops.
///
/// Appends and reads pass straight through.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(FlakyEventStore::new(Arc::new(InMemoryEventStore::new())));
/// store.fail_next_ready_checks(3);
/// store.drop_subscriptions();
/// ```
pub struct FlakyEventStore {
    inner: Arc<dyn EventStore>,
    failing_ready_checks: AtomicUsize,
    failing_subscribes: AtomicUsize,
    dead_feeds: AtomicBool,
    ready_checks: AtomicUsize,
    subscribes: AtomicUsize,
    drops: watch::Sender<u64>,
}

impl FlakyEventStore {
    /// Wrap `inner`. Nothing fails until asked to.
    #[must_use]
    pub fn new(inner: Arc<dyn EventStore>) -> Self {
        let (drops, _) = watch::channel(0);
        Self {
            inner,
            failing_ready_checks: AtomicUsize::new(0),
            failing_subscribes: AtomicUsize::new(0),
            dead_feeds: AtomicBool::new(false),
            ready_checks: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            drops,
        }
    }

    /// Fail the next `count` readiness probes with `NotReady`.
    pub fn fail_next_ready_checks(&self, count: usize) {
        self.failing_ready_checks.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` subscribe calls with `NotReady`.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// While `dead` is set, every subscribe succeeds but its feed drops
    /// before delivering anything.
    pub fn drop_feeds_at_once(&self, dead: bool) {
        self.dead_feeds.store(dead, Ordering::SeqCst);
    }

    /// End every open subscription with a drop notice.
    pub fn drop_subscriptions(&self) {
        self.drops.send_modify(|n| *n += 1);
    }

    /// Readiness probes received so far, failed ones included.
    #[must_use]
    pub fn ready_checks(&self) -> usize {
        self.ready_checks.load(Ordering::SeqCst)
    }

    /// Subscribe calls received so far, failed ones included.
    #[must_use]
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
}

impl EventStore for FlakyEventStore {
    fn append_to_stream(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        self.inner.append_to_stream(stream_id, expected, events)
    }

    fn read_forward(
        &self,
        stream_id: StreamId,
        from: Version,
        max_count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ReadSlice, EventStoreError>> + Send + '_>> {
        self.inner.read_forward(stream_id, from, max_count)
    }

    fn read_backward(
        &self,
        stream_id: StreamId,
        from: StreamCursor,
        max_count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ReadSlice, EventStoreError>> + Send + '_>> {
        self.inner.read_backward(stream_id, from, max_count)
    }

    fn read_event(
        &self,
        stream_id: StreamId,
        position: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RecordedEvent>, EventStoreError>> + Send + '_>> {
        self.inner.read_event(stream_id, position)
    }

    fn subscribe_from(
        &self,
        stream_id: StreamId,
        after: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<EventSubscription, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.failing_subscribes) {
                return Err(EventStoreError::NotReady("injected subscribe failure".to_string()));
            }

            if self.dead_feeds.load(Ordering::SeqCst) {
                let dead = futures::stream::iter([Err(SubscriptionDropped::new("injected drop"))]);
                return Ok(Box::pin(dead) as EventSubscription);
            }

            let mut inner = self.inner.subscribe_from(stream_id, after).await?;
            let mut drops = self.drops.subscribe();

            let feed = stream! {
                loop {
                    let item = tokio::select! {
                        biased;
                        _ = drops.changed() => None,
                        item = inner.next() => Some(item),
                    };

                    match item {
                        None => {
                            yield Err(SubscriptionDropped::new("injected drop"));
                            break;
                        }
                        Some(Some(item)) => yield item,
                        Some(None) => break,
                    }
                }
            };

            Ok(Box::pin(feed) as EventSubscription)
        })
    }

    fn ensure_ready(&self) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            self.ready_checks.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.failing_ready_checks) {
                return Err(EventStoreError::NotReady("injected readiness failure".to_string()));
            }
            self.inner.ensure_ready().await
        })
    }
}
