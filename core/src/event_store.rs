//! Event store trait and related types.
//!
//! This module defines everything the balance core needs from the store that
//! holds the event log:
//!
//! - Append events to a stream with optimistic concurrency
//! - Read a stream forward or backward in pages
//! - Read a single event by position
//! - Subscribe from a position: historical events first, then live ones
//!
//! # Implementations
//!
//! - `InMemoryEventStore` (in `balance-store`): fast, deterministic, volatile
//! - `FileEventStore` (in `balance-store`): the same, journaled to disk
//!
//! # Example
//!
//! ```no_run
//! use balance_core::event::{EventData, EventKind};
//! use balance_core::event_store::{EventStore, EventStoreError};
//! use balance_core::stream::{ExpectedVersion, StreamId, Version};
//!
//! async fn example(store: &dyn EventStore) -> Result<(), Box<dyn std::error::Error>> {
//!     let stream_id = StreamId::new("account-42");
//!
//!     // First event of a new stream
//!     let first = store
//!         .append_to_stream(
//!             stream_id.clone(),
//!             ExpectedVersion::NoStream,
//!             vec![EventData::balance(EventKind::Credit, 100)?],
//!         )
//!         .await?;
//!     assert_eq!(first, Version::FIRST);
//!
//!     // Subsequent appends must name the current version
//!     match store
//!         .append_to_stream(
//!             stream_id.clone(),
//!             ExpectedVersion::NoStream,
//!             vec![EventData::balance(EventKind::Debit, 30)?],
//!         )
//!         .await
//!     {
//!         Err(EventStoreError::ConcurrencyConflict { .. }) => {}
//!         other => panic!("expected a conflict, got {other:?}"),
//!     }
//!
//!     let page = store.read_forward(stream_id, Version::FIRST, 20).await?;
//!     assert!(page.is_end_of_stream);
//!     Ok(())
//! }
//! ```

use futures::stream::BoxStream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::event::{EventData, RecordedEvent};
use crate::stream::{ExpectedVersion, StreamCursor, StreamId, Version};

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    ///
    /// Another writer appended to the stream since the caller last looked at it.
    #[error(
        "Concurrency conflict on {stream_id}: expected version {expected}, found {}",
        CurrentVersion(.actual)
    )]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The expectation the append carried.
        expected: ExpectedVersion,
        /// The actual current version of the stream.
        actual: Option<Version>,
    },

    /// An append carried no events.
    #[error("Nothing to append to {0}")]
    EmptyAppend(StreamId),

    /// The store cannot serve requests (yet).
    #[error("Event store not ready: {0}")]
    NotReady(String),

    /// Storage I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

struct CurrentVersion<'a>(&'a Option<Version>);

impl fmt::Display for CurrentVersion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(version) => write!(f, "{version}"),
            None => write!(f, "no stream"),
        }
    }
}

/// One page of a stream read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSlice {
    /// Events in read order (ascending for forward reads, descending for backward).
    pub events: Vec<RecordedEvent>,

    /// Where the next page starts, if there is anything left in that direction.
    ///
    /// Forward reads always report the position after the last event, so a
    /// later read picks up events appended in the meantime.
    pub next_position: Option<Version>,

    /// Whether this page reached the end of the stream in the read direction.
    pub is_end_of_stream: bool,
}

impl ReadSlice {
    /// A slice of an empty or exhausted stream.
    #[must_use]
    pub const fn end(next_position: Option<Version>) -> Self {
        Self {
            events: Vec::new(),
            next_position,
            is_end_of_stream: true,
        }
    }
}

/// Item delivered by a catch-up subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionMessage {
    /// The next event of the stream.
    Event(RecordedEvent),

    /// Every historical event has been delivered; what follows is live.
    CaughtUp,
}

/// Reason a subscription stopped delivering events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Subscription dropped: {reason}")]
pub struct SubscriptionDropped {
    /// Human-readable cause.
    pub reason: String,
}

impl SubscriptionDropped {
    /// Create a drop notice.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A live catch-up feed.
///
/// Events arrive strictly in stream order, each exactly once. The stream ends
/// (or yields an `Err`) when the subscription drops; the consumer then
/// subscribes again from its own checkpoint.
pub type EventSubscription =
    BoxStream<'static, Result<SubscriptionMessage, SubscriptionDropped>>;

/// Event store abstraction for a single-writer-checked, append-only log.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the projection and the command
/// gateway share one handle across tasks.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the store can be held as
/// `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// # Returns
    ///
    /// The position of the last appended event, i.e. the new current version.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: `expected` does not match the stream
    /// - `EmptyAppend`: `events` is empty
    /// - `Io` / `Serialization`: the store could not persist the events
    fn append_to_stream(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Read up to `max_count` events starting at `from`, oldest first.
    ///
    /// Reading a stream that does not exist returns an empty end-of-stream slice.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the store cannot be read.
    fn read_forward(
        &self,
        stream_id: StreamId,
        from: Version,
        max_count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ReadSlice, EventStoreError>> + Send + '_>>;

    /// Read up to `max_count` events starting at `from`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the store cannot be read.
    fn read_backward(
        &self,
        stream_id: StreamId,
        from: StreamCursor,
        max_count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ReadSlice, EventStoreError>> + Send + '_>>;

    /// Read the event at `position`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the store cannot be read.
    fn read_event(
        &self,
        stream_id: StreamId,
        position: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RecordedEvent>, EventStoreError>> + Send + '_>>;

    /// Subscribe to a stream, starting strictly after `after`.
    ///
    /// `None` starts from the first event. Historical events are delivered
    /// first, followed by [`SubscriptionMessage::CaughtUp`], followed by live
    /// events as they are appended.
    ///
    /// # Errors
    ///
    /// Returns `NotReady` or `Io` if the subscription cannot be opened.
    fn subscribe_from(
        &self,
        stream_id: StreamId,
        after: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<EventSubscription, EventStoreError>> + Send + '_>>;

    /// Readiness probe, retried at startup before anything else touches the store.
    ///
    /// # Errors
    ///
    /// Returns `NotReady` while the store cannot serve requests.
    fn ensure_ready(&self) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>>;
}
