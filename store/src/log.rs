//! Shared engine behind both store implementations.
//!
//! All streams live in one map behind a `tokio` `RwLock`. Appends hold the
//! write lock across the version check, the optional journal write and the
//! in-memory push, so the check and the write are one atomic step.
//!
//! Subscribers are woken through a `watch` channel carrying a [`Signal`]:
//! a counter bumped on every append, a counter bumped whenever subscribers are
//! forcibly disconnected, and a closed flag.

use async_stream::stream;
use balance_core::event::{EventData, RecordedEvent};
use balance_core::event_store::{
    EventStoreError, EventSubscription, ReadSlice, SubscriptionDropped, SubscriptionMessage,
};
use balance_core::stream::{ExpectedVersion, StreamCursor, StreamId, Version};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

use crate::journal::Journal;

/// Events delivered per lock acquisition while a subscriber catches up.
const CATCH_UP_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Signal {
    appended: u64,
    disconnects: u64,
    closed: bool,
}

pub(crate) struct Log {
    streams: RwLock<HashMap<StreamId, Vec<RecordedEvent>>>,
    journal: Option<tokio::sync::Mutex<Journal>>,
    signal: watch::Sender<Signal>,
}

impl Log {
    pub(crate) fn new(events: Vec<RecordedEvent>, journal: Option<Journal>) -> Arc<Self> {
        let mut streams: HashMap<StreamId, Vec<RecordedEvent>> = HashMap::new();
        for event in events {
            streams.entry(event.stream_id.clone()).or_default().push(event);
        }

        let (signal, _) = watch::channel(Signal::default());

        Arc::new(Self {
            streams: RwLock::new(streams),
            journal: journal.map(tokio::sync::Mutex::new),
            signal,
        })
    }

    fn is_closed(&self) -> bool {
        self.signal.borrow().closed
    }

    fn check_open(&self) -> Result<(), EventStoreError> {
        if self.is_closed() {
            return Err(EventStoreError::NotReady("event store is closed".to_string()));
        }
        Ok(())
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), EventStoreError> {
        self.check_open()
    }

    pub(crate) async fn append(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<Version, EventStoreError> {
        self.check_open()?;
        if events.is_empty() {
            return Err(EventStoreError::EmptyAppend(stream_id));
        }

        let mut streams = self.streams.write().await;
        let stream = streams.entry(stream_id.clone()).or_default();
        let current = stream.last().map(|event| event.position);

        if !expected.matches(current) {
            tracing::debug!(
                stream = %stream_id,
                expected = %expected,
                actual = ?current,
                "Rejecting append on version mismatch"
            );
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual: current,
            });
        }

        let recorded_at = Utc::now();
        let mut next = Version::resume_after(current);
        let recorded: Vec<RecordedEvent> = events
            .into_iter()
            .map(|data| {
                let event = RecordedEvent::from_data(stream_id.clone(), next, data, recorded_at);
                next = next.next();
                event
            })
            .collect();

        if let Some(journal) = &self.journal {
            journal.lock().await.append(&recorded).await?;
        }

        let count = recorded.len() as u64;
        let last = next.previous().unwrap_or(Version::FIRST);
        stream.extend(recorded);
        drop(streams);

        self.signal.send_modify(|signal| signal.appended += count);
        tracing::debug!(stream = %stream_id, position = %last, count, "Appended events");

        Ok(last)
    }

    pub(crate) async fn read_forward(
        &self,
        stream_id: &StreamId,
        from: Version,
        max_count: usize,
    ) -> Result<ReadSlice, EventStoreError> {
        self.check_open()?;
        let streams = self.streams.read().await;
        let Some(stream) = streams.get(stream_id) else {
            return Ok(ReadSlice::end(Some(from)));
        };

        let start = usize::try_from(from.value()).unwrap_or(usize::MAX);
        let events: Vec<RecordedEvent> = stream
            .iter()
            .skip(start)
            .take(max_count.max(1))
            .cloned()
            .collect();

        let next_position = events.last().map_or(from, |event| event.position.next());
        let is_end_of_stream = usize::try_from(next_position.value())
            .map_or(true, |next| next >= stream.len());

        Ok(ReadSlice {
            events,
            next_position: Some(next_position),
            is_end_of_stream,
        })
    }

    pub(crate) async fn read_backward(
        &self,
        stream_id: &StreamId,
        from: StreamCursor,
        max_count: usize,
    ) -> Result<ReadSlice, EventStoreError> {
        self.check_open()?;
        let streams = self.streams.read().await;
        let Some(stream) = streams.get(stream_id).filter(|stream| !stream.is_empty()) else {
            return Ok(ReadSlice::end(None));
        };

        let last = stream.len() - 1;
        let start = match from {
            StreamCursor::Start => 0,
            StreamCursor::End => last,
            StreamCursor::At(position) => usize::try_from(position.value()).map_or(last, |p| p.min(last)),
        };

        let events: Vec<RecordedEvent> = stream[..=start]
            .iter()
            .rev()
            .take(max_count.max(1))
            .cloned()
            .collect();

        let next_position = events.last().and_then(|event| event.position.previous());

        Ok(ReadSlice {
            events,
            next_position,
            is_end_of_stream: next_position.is_none(),
        })
    }

    pub(crate) async fn read_event(
        &self,
        stream_id: &StreamId,
        position: Version,
    ) -> Result<Option<RecordedEvent>, EventStoreError> {
        self.check_open()?;
        let streams = self.streams.read().await;
        let index = usize::try_from(position.value()).ok();

        Ok(streams
            .get(stream_id)
            .zip(index)
            .and_then(|(stream, index)| stream.get(index))
            .cloned())
    }

    /// Catch-up subscription: history from `after`, a `CaughtUp` marker, then live events.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        stream_id: StreamId,
        after: Option<Version>,
    ) -> Result<EventSubscription, EventStoreError> {
        self.check_open()?;

        // Subscribe to the signal before the first read so no append between
        // the read and the wait can be missed.
        let mut changes = self.signal.subscribe();
        let disconnects_at_start = changes.borrow().disconnects;
        let log = Arc::clone(self);

        tracing::debug!(stream = %stream_id, after = ?after, "Opening catch-up subscription");

        let feed = stream! {
            let mut next = Version::resume_after(after);
            let mut caught_up = false;

            loop {
                let batch = log.batch_from(&stream_id, next).await;

                if batch.is_empty() {
                    if !caught_up {
                        caught_up = true;
                        yield Ok(SubscriptionMessage::CaughtUp);
                    }

                    if changes.changed().await.is_err() {
                        yield Err(SubscriptionDropped::new("event store shut down"));
                        break;
                    }

                    let signal = *changes.borrow_and_update();
                    if signal.closed {
                        yield Err(SubscriptionDropped::new("event store closed"));
                        break;
                    }
                    if signal.disconnects != disconnects_at_start {
                        yield Err(SubscriptionDropped::new("connection to event store lost"));
                        break;
                    }
                    continue;
                }

                for event in batch {
                    next = event.position.next();
                    yield Ok(SubscriptionMessage::Event(event));
                }
            }
        };

        Ok(Box::pin(feed))
    }

    async fn batch_from(&self, stream_id: &StreamId, from: Version) -> Vec<RecordedEvent> {
        let streams = self.streams.read().await;
        let start = usize::try_from(from.value()).unwrap_or(usize::MAX);

        streams
            .get(stream_id)
            .map(|stream| stream.iter().skip(start).take(CATCH_UP_BATCH).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every open subscription, as a lost connection would.
    pub(crate) fn disconnect_subscribers(&self) {
        tracing::warn!("Disconnecting all subscribers");
        self.signal.send_modify(|signal| signal.disconnects += 1);
    }

    pub(crate) fn close(&self) {
        tracing::info!("Closing event store");
        self.signal.send_modify(|signal| signal.closed = true);
    }

    pub(crate) async fn stream_version(&self, stream_id: &StreamId) -> Option<Version> {
        self.streams
            .read()
            .await
            .get(stream_id)
            .and_then(|stream| stream.last())
            .map(|event| event.position)
    }
}
