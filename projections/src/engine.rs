//! The balance projection engine.
//!
//! # Overview
//!
//! [`BalanceProjection`] keeps the derived balance of one stream up to date:
//!
//! - Loads the last checkpoint and publishes its balance
//! - Subscribes to the stream strictly after the checkpoint position
//! - Folds every event into the balance, one at a time, saving a checkpoint
//!   after each successfully folded event
//! - Resubscribes from the last checkpoint when the subscription drops,
//!   backing off while drops repeat without progress
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Event Store  │
//! └──────┬───────┘
//!        │ catch-up subscription
//!        ▼
//! ┌──────────────────┐      ┌─────────────────┐
//! │BalanceProjection │─────▶│ CheckpointStore │
//! └──────┬───────────┘      └─────────────────┘
//!        │ set_total / set_error
//!        ▼
//! ┌──────────────────┐
//! │ PresentationSink │
//! └──────────────────┘
//! ```
//!
//! # Delivery guarantees
//!
//! The checkpoint is saved before the next event is polled, so checkpoint N
//! is never persisted before N-1. Events at or before the checkpoint are
//! skipped, so a redelivered event is never applied twice.
//!
//! # Example
//!
//! ```ignore
//! let (mut projection, shutdown) = BalanceProjection::new(
//!     store,
//!     checkpoints,
//!     sink,
//!     StreamId::new("account-balance"),
//! );
//! let checkpoint = projection.checkpoint();
//!
//! let task = tokio::spawn(async move { projection.run().await });
//!
//! // Later:
//! shutdown.send(true).ok();
//! task.await??;
//! ```

use balance_core::balance::apply_event;
use balance_core::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use balance_core::event::RecordedEvent;
use balance_core::event_store::{
    EventStore, EventStoreError, EventSubscription, SubscriptionDropped, SubscriptionMessage,
};
use balance_core::sink::PresentationSink;
use balance_core::stream::StreamId;
use balance_runtime::retry::{RetryPolicy, retry_with_backoff};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Lifecycle of the projection.
///
/// ```text
/// Unsubscribed → CatchingUp → Live → Dropped → CatchingUp → ...
///                                  ↘ Stopped | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionState {
    /// Not subscribed yet.
    Unsubscribed,
    /// Receiving historical events.
    CatchingUp,
    /// Caught up; receiving events as they are appended.
    Live,
    /// The subscription dropped; resubscribing.
    Dropped,
    /// Stopped by the shutdown signal.
    Stopped,
    /// Ended by a fatal error.
    Failed,
}

/// Fatal projection errors.
///
/// Bad events are not errors at this level: they are reported to the sink and
/// skipped.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// The checkpoint could not be saved; continuing would lose the fold.
    #[error("Failed to save checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// The stream could not be (re)subscribed within the retry budget.
    #[error("Failed to subscribe to {stream_id}: {source}")]
    Subscribe {
        /// Stream the projection follows.
        stream_id: StreamId,
        /// Last subscription error.
        #[source]
        source: EventStoreError,
    },

    /// The subscription kept dropping before delivering anything.
    #[error("Subscription to {stream_id} keeps dropping: {source}")]
    Unstable {
        /// Stream the projection follows.
        stream_id: StreamId,
        /// Last drop.
        #[source]
        source: SubscriptionDropped,
    },
}

/// How one subscription ended.
enum FeedEnd {
    Shutdown,
    /// `delivered` is false if the feed dropped before any event or the
    /// caught-up marker.
    Dropped {
        dropped: SubscriptionDropped,
        delivered: bool,
    },
}

/// Keeps the balance of one stream folded into a checkpoint.
///
/// Only the projection writes checkpoints. Other components observe them
/// through [`checkpoint`](Self::checkpoint).
pub struct BalanceProjection {
    store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn PresentationSink>,
    stream_id: StreamId,
    resubscribe_policy: RetryPolicy,
    checkpoint_tx: watch::Sender<Checkpoint>,
    state_tx: watch::Sender<ProjectionState>,
    shutdown: watch::Receiver<bool>,
}

impl BalanceProjection {
    /// Create a projection of `stream_id`.
    ///
    /// Returns the projection and a shutdown sender. Send `true` to stop the
    /// projection between two events.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn PresentationSink>,
        stream_id: StreamId,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (checkpoint_tx, _) = watch::channel(checkpoints.current());
        let (state_tx, _) = watch::channel(ProjectionState::Unsubscribed);

        let projection = Self {
            store,
            checkpoints,
            sink,
            stream_id,
            resubscribe_policy: RetryPolicy::default(),
            checkpoint_tx,
            state_tx,
            shutdown: shutdown_rx,
        };

        (projection, shutdown_tx)
    }

    /// Set the retry policy for (re)subscribing.
    #[must_use]
    pub const fn with_resubscribe_policy(mut self, policy: RetryPolicy) -> Self {
        self.resubscribe_policy = policy;
        self
    }

    /// Watch the last saved checkpoint.
    #[must_use]
    pub fn checkpoint(&self) -> watch::Receiver<Checkpoint> {
        self.checkpoint_tx.subscribe()
    }

    /// Watch the lifecycle state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ProjectionState> {
        self.state_tx.subscribe()
    }

    /// Stream this projection follows.
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Run until shutdown or a fatal error.
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::Checkpoint`] if a checkpoint cannot be saved
    /// - [`ProjectionError::Subscribe`] if the stream cannot be subscribed
    ///   within the retry budget
    /// - [`ProjectionError::Unstable`] if subscriptions keep dropping before
    ///   delivering anything, more often than the retry budget allows
    pub async fn run(&mut self) -> Result<(), ProjectionError> {
        let checkpoint = self.checkpoints.load().await;
        match checkpoint.position {
            Some(position) => tracing::info!(
                stream = %self.stream_id,
                position = %position,
                balance = checkpoint.value,
                "Resuming from checkpoint"
            ),
            None => tracing::info!(stream = %self.stream_id, "Starting from beginning"),
        }
        self.checkpoint_tx.send_replace(checkpoint);
        self.sink.set_total(checkpoint.value);

        // Consecutive drops without progress.
        let mut drops = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let Some(feed) = self.subscribe().await? else {
                break;
            };

            let (dropped, delivered) = match self.consume(feed).await? {
                FeedEnd::Shutdown => break,
                FeedEnd::Dropped { dropped, delivered } => (dropped, delivered),
            };

            tracing::warn!(stream = %self.stream_id, reason = %dropped.reason, "Subscription dropped");
            self.sink.set_error(&dropped.to_string());
            self.state_tx.send_replace(ProjectionState::Dropped);

            if delivered {
                drops = 0;
            }
            if drops >= self.resubscribe_policy.max_retries {
                tracing::error!(stream = %self.stream_id, drops, "Giving up on unstable subscription");
                self.state_tx.send_replace(ProjectionState::Failed);
                return Err(ProjectionError::Unstable {
                    stream_id: self.stream_id.clone(),
                    source: dropped,
                });
            }

            let delay = self.resubscribe_policy.delay_for_attempt(drops);
            drops += 1;
            tracing::debug!(stream = %self.stream_id, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Waiting before resubscribing");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown_requested(&mut self.shutdown) => break,
            }
        }

        tracing::info!(stream = %self.stream_id, "Projection stopped");
        self.state_tx.send_replace(ProjectionState::Stopped);
        Ok(())
    }

    /// Subscribe after the current checkpoint, retrying with backoff.
    ///
    /// `None` if shutdown was requested while retrying.
    async fn subscribe(&mut self) -> Result<Option<EventSubscription>, ProjectionError> {
        let after = self.checkpoint_tx.borrow().position;
        let store = &self.store;
        let stream_id = &self.stream_id;

        tracing::info!(stream = %stream_id, after = ?after, "Subscribing");

        let attempt = retry_with_backoff(&self.resubscribe_policy, "subscribe", || {
            store.subscribe_from(stream_id.clone(), after)
        });

        let result = tokio::select! {
            result = attempt => result,
            () = shutdown_requested(&mut self.shutdown) => return Ok(None),
        };

        match result {
            Ok(feed) => {
                self.state_tx.send_replace(ProjectionState::CatchingUp);
                Ok(Some(feed))
            }
            Err(source) => {
                tracing::error!(stream = %self.stream_id, error = %source, "Giving up on subscription");
                self.sink.set_error(&source.to_string());
                self.state_tx.send_replace(ProjectionState::Failed);
                Err(ProjectionError::Subscribe {
                    stream_id: self.stream_id.clone(),
                    source,
                })
            }
        }
    }

    async fn consume(&mut self, mut feed: EventSubscription) -> Result<FeedEnd, ProjectionError> {
        let mut delivered = false;

        loop {
            let item = tokio::select! {
                biased;
                () = shutdown_requested(&mut self.shutdown) => return Ok(FeedEnd::Shutdown),
                item = feed.next() => item,
            };

            match item {
                Some(Ok(SubscriptionMessage::Event(event))) => {
                    delivered = true;
                    self.handle(&event).await?;
                }
                Some(Ok(SubscriptionMessage::CaughtUp)) => {
                    delivered = true;
                    tracing::info!(
                        stream = %self.stream_id,
                        position = ?self.checkpoint_tx.borrow().position,
                        "Caught up, now live"
                    );
                    self.state_tx.send_replace(ProjectionState::Live);
                }
                Some(Err(dropped)) => return Ok(FeedEnd::Dropped { dropped, delivered }),
                None => {
                    return Ok(FeedEnd::Dropped {
                        dropped: SubscriptionDropped::new("subscription ended"),
                        delivered,
                    });
                }
            }
        }
    }

    /// Fold one event and save the resulting checkpoint.
    async fn handle(&self, event: &RecordedEvent) -> Result<(), ProjectionError> {
        let checkpoint = *self.checkpoint_tx.borrow();

        if checkpoint.covers(event.position) {
            tracing::debug!(position = %event.position, "Skipping already folded event");
            return Ok(());
        }

        let value = match apply_event(checkpoint.value, event) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    position = %event.position,
                    event_type = %event.event_type,
                    error = %e,
                    "Skipping event that cannot be folded"
                );
                self.sink.set_error(&format!("Event Exception: {e}"));
                return Ok(());
            }
        };

        let next = Checkpoint::at(event.position, value);
        if let Err(e) = self.checkpoints.save(next).await {
            tracing::error!(position = %event.position, error = %e, "Checkpoint save failed");
            self.sink.set_error(&e.to_string());
            self.state_tx.send_replace(ProjectionState::Failed);
            return Err(e.into());
        }

        tracing::debug!(position = %event.position, balance = value, "Checkpoint saved");
        self.checkpoint_tx.send_replace(next);
        self.sink.set_total(value);
        Ok(())
    }
}

/// Resolves once `true` is sent. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_requested_resolves_on_true() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        let resolved =
            tokio::time::timeout(std::time::Duration::from_millis(100), shutdown_requested(&mut rx)).await;
        assert!(resolved.is_ok());
    }

    #[tokio::test]
    async fn shutdown_requested_waits_while_false() {
        let (_tx, mut rx) = watch::channel(false);
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), shutdown_requested(&mut rx)).await;
        assert!(waited.is_err());
    }
}
