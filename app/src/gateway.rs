//! Command gateway: turns user intents into appends on the account stream.
//!
//! The gateway never touches the balance. It derives expected versions from
//! the projection's checkpoint, so a command only goes through when the
//! projection has seen everything the stream holds. Otherwise the store
//! rejects the append with a concurrency conflict.
//!
//! | operation     | expected version               |
//! |---------------|--------------------------------|
//! | `credit`      | checkpoint position            |
//! | `debit`       | checkpoint position            |
//! | `undo_last`   | checkpoint position            |
//! | `repeat_last` | position of the repeated event |
//! | `repeat_at`   | any                            |

use balance_core::checkpoint::Checkpoint;
use balance_core::event::{AmountPayload, EventData, EventKind, PayloadError, RecordedEvent};
use balance_core::event_store::{EventStore, EventStoreError};
use balance_core::stream::{ExpectedVersion, StreamCursor, StreamId, Version};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Why a command was not carried out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The stream moved past the checkpoint. Not retried.
    #[error("{0}")]
    Conflict(EventStoreError),

    /// There is no event to repeat.
    #[error("Event not found to repeat")]
    NotFound,

    /// There is no event to undo, or the projection has not folded anything yet.
    #[error("Event not found to undo")]
    NothingToUndo,

    /// Any other store failure.
    #[error("{0}")]
    Store(EventStoreError),

    /// The event to undo carries no usable amount.
    #[error("Event Exception: {0}")]
    Payload(#[from] PayloadError),
}

impl From<EventStoreError> for CommandError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict { .. } => Self::Conflict(error),
            other => Self::Store(other),
        }
    }
}

/// Issues balance commands against one stream.
#[derive(Clone)]
pub struct CommandGateway {
    store: Arc<dyn EventStore>,
    stream_id: StreamId,
    checkpoint: watch::Receiver<Checkpoint>,
    page_size: usize,
}

impl CommandGateway {
    /// Create a gateway.
    ///
    /// `checkpoint` is the projection's checkpoint feed; `page_size` is the
    /// slice size used by [`list`](Self::list).
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        stream_id: StreamId,
        checkpoint: watch::Receiver<Checkpoint>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            stream_id,
            checkpoint,
            page_size: page_size.max(1),
        }
    }

    /// The checkpoint as last published by the projection.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        *self.checkpoint.borrow()
    }

    fn expected_from_checkpoint(&self) -> ExpectedVersion {
        ExpectedVersion::from(self.checkpoint().position)
    }

    async fn append(&self, expected: ExpectedVersion, event: EventData) -> Result<Version, CommandError> {
        let event_type = event.event_type.clone();
        let position = self
            .store
            .append_to_stream(self.stream_id.clone(), expected, vec![event])
            .await
            .inspect_err(|e| {
                tracing::warn!(stream = %self.stream_id, expected = %expected, error = %e, "Append rejected");
            })?;

        tracing::info!(stream = %self.stream_id, event_type = %event_type, position = %position, "Event appended");
        Ok(position)
    }

    async fn last_event(&self) -> Result<Option<RecordedEvent>, CommandError> {
        let slice = self
            .store
            .read_backward(self.stream_id.clone(), StreamCursor::End, 1)
            .await?;
        Ok(slice.events.into_iter().next())
    }

    /// Append a CREDIT of `amount`.
    ///
    /// # Errors
    ///
    /// [`CommandError::Conflict`] if the stream is ahead of the checkpoint.
    pub async fn credit(&self, amount: i64) -> Result<Version, CommandError> {
        self.add(EventKind::Credit, amount).await
    }

    /// Append a DEBIT of `amount`.
    ///
    /// # Errors
    ///
    /// [`CommandError::Conflict`] if the stream is ahead of the checkpoint.
    pub async fn debit(&self, amount: i64) -> Result<Version, CommandError> {
        self.add(EventKind::Debit, amount).await
    }

    async fn add(&self, kind: EventKind, amount: i64) -> Result<Version, CommandError> {
        let event = EventData::balance(kind, amount)?;
        self.append(self.expected_from_checkpoint(), event).await
    }

    /// Compensate the last event: same type, negated amount, same metadata.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NothingToUndo`] if the stream is empty or nothing
    ///   has been folded yet
    /// - [`CommandError::Payload`] if the last event has no usable amount
    /// - [`CommandError::Conflict`] if the stream is ahead of the checkpoint
    pub async fn undo_last(&self) -> Result<Version, CommandError> {
        let last = self.last_event().await?;
        let checkpoint = self.checkpoint();

        let (Some(event), Some(position)) = (last, checkpoint.position) else {
            return Err(CommandError::NothingToUndo);
        };

        let amount = event.amount()?;
        let reversed = amount
            .checked_neg()
            .ok_or_else(|| PayloadError::InvalidAmount(amount.to_string()))?;

        let compensation = EventData::new(
            event.event_type.clone(),
            event.is_json,
            AmountPayload::new(reversed).to_bytes()?,
            event.metadata.clone(),
        );

        self.append(ExpectedVersion::Exact(position), compensation).await
    }

    /// Append a copy of the last event.
    ///
    /// The expected version is the copied event's own position, not the
    /// checkpoint: the repeat succeeds as long as nothing was appended after
    /// that event, even if the projection lags behind.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] if the stream is empty
    /// - [`CommandError::Conflict`] if another event was appended meanwhile
    pub async fn repeat_last(&self) -> Result<Version, CommandError> {
        let event = self.last_event().await?.ok_or(CommandError::NotFound)?;
        self.append(ExpectedVersion::Exact(event.position), EventData::replay_of(&event))
            .await
    }

    /// Append a copy of the event at `position`, without a concurrency check.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] if there is no event at `position`.
    pub async fn repeat_at(&self, position: Version) -> Result<Version, CommandError> {
        let event = self
            .store
            .read_event(self.stream_id.clone(), position)
            .await?
            .ok_or(CommandError::NotFound)?;

        self.append(ExpectedVersion::Any, EventData::replay_of(&event)).await
    }

    /// The whole stream, oldest first or (with `reversed`) newest first.
    ///
    /// # Errors
    ///
    /// [`CommandError::Store`] if a page cannot be read.
    pub async fn list(&self, reversed: bool) -> Result<Vec<RecordedEvent>, CommandError> {
        let mut events = Vec::new();

        if reversed {
            let mut cursor = StreamCursor::End;
            loop {
                let slice = self
                    .store
                    .read_backward(self.stream_id.clone(), cursor, self.page_size)
                    .await?;
                events.extend(slice.events);
                match slice.next_position {
                    Some(next) if !slice.is_end_of_stream => cursor = StreamCursor::At(next),
                    _ => break,
                }
            }
        } else {
            let mut from = Version::FIRST;
            loop {
                let slice = self
                    .store
                    .read_forward(self.stream_id.clone(), from, self.page_size)
                    .await?;
                events.extend(slice.events);
                match slice.next_position {
                    Some(next) if !slice.is_end_of_stream => from = next,
                    _ => break,
                }
            }
        }

        tracing::debug!(stream = %self.stream_id, reversed, count = events.len(), "Listed events");
        Ok(events)
    }
}
