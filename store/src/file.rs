//! Durable event store journaled to a local file.

use balance_core::event::{EventData, RecordedEvent};
use balance_core::event_store::{EventStore, EventStoreError, EventSubscription, ReadSlice};
use balance_core::stream::{ExpectedVersion, StreamCursor, StreamId, Version};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::journal::Journal;
use crate::log::Log;

/// Event store that survives restarts.
///
/// Every accepted append is written to a JSON-lines journal and synced before
/// the append returns. The whole journal is read into memory on
/// [`open`](Self::open); reads and subscriptions are then served from memory.
#[derive(Clone)]
pub struct FileEventStore {
    path: PathBuf,
    log: Arc<Log>,
}

impl FileEventStore {
    /// Open the journal at `path`, creating it (and its parent directories) if needed.
    ///
    /// # Errors
    ///
    /// - `Io` if the journal cannot be read or created
    /// - `Serialization` if an entry other than a torn final line is corrupt
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EventStoreError> {
        let path = path.as_ref();
        let (journal, events) = Journal::open(path).await?;

        Ok(Self {
            path: path.to_path_buf(),
            log: Log::new(events, Some(journal)),
        })
    }

    /// Location of the journal.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every open subscription.
    pub fn disconnect_subscribers(&self) {
        self.log.disconnect_subscribers();
    }

    /// Refuse all further requests and end open subscriptions.
    pub fn close(&self) {
        self.log.close();
    }
}

impl EventStore for FileEventStore {
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
