//! In-memory doubles for the projection's collaborators.
//!
//! - [`InMemoryCheckpointStore`]: checkpoint storage with save history and
//!   injectable write failures
//! - [`RecordingSink`]: a presentation sink that remembers every call

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use balance_core::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use balance_core::event::RecordedEvent;
use balance_core::sink::PresentationSink;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct CheckpointState {
    persisted: Option<Checkpoint>,
    mirror: Checkpoint,
    saves: Vec<Checkpoint>,
}

/// In-memory checkpoint store for fast, deterministic testing.
///
/// Clones share state, so a "restarted" projection can be handed a clone and
/// see what the previous one persisted.
///
/// # Example
///
/// ```
/// use balance_core::checkpoint::{Checkpoint, CheckpointStore};
/// use balance_core::stream::Version;
/// use balance_testing::InMemoryCheckpointStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let checkpoints = InMemoryCheckpointStore::new();
/// checkpoints.save(Checkpoint::at(Version::new(1), 70)).await?;
///
/// assert_eq!(checkpoints.load().await, Checkpoint::at(Version::new(1), 70));
/// assert_eq!(checkpoints.saves().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryCheckpointStore {
    state: Arc<RwLock<CheckpointState>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemoryCheckpointStore {
    /// Create a store with nothing persisted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store as if `checkpoint` had been saved by an earlier run.
    #[must_use]
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::new();
        store.state.write().unwrap().persisted = Some(checkpoint);
        store
    }

    /// Make every following `save` fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Every checkpoint saved so far, oldest first.
    #[must_use]
    pub fn saves(&self) -> Vec<Checkpoint> {
        self.state.read().unwrap().saves.clone()
    }

    /// What a fresh `load` would return.
    #[must_use]
    pub fn persisted(&self) -> Checkpoint {
        self.state.read().unwrap().persisted.unwrap_or_default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Checkpoint> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.mirror = state.persisted.unwrap_or_default();
            state.mirror
        })
    }

    fn save(
        &self,
        checkpoint: Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(CheckpointError::Storage("injected save failure".to_string()));
            }

            let mut state = self.state.write().unwrap();
            state.persisted = Some(checkpoint);
            state.mirror = checkpoint;
            state.saves.push(checkpoint);
            Ok(())
        })
    }

    fn current(&self) -> Checkpoint {
        self.state.read().unwrap().mirror
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.persisted = None;
            state.mirror = Checkpoint::empty();
            Ok(())
        })
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkCall {
    /// `set_total`
    Total(i64),
    /// `set_error`
    Error(String),
    /// `set_event_list`
    EventList(Vec<RecordedEvent>),
}

/// Presentation sink that records every call for later assertions.
///
/// ```
/// use balance_core::sink::PresentationSink;
/// use balance_testing::RecordingSink;
///
/// let sink = RecordingSink::new();
/// sink.set_total(100);
/// sink.set_error("Unknown Command");
///
/// assert_eq!(sink.last_total(), Some(100));
/// assert_eq!(sink.errors(), vec!["Unknown Command".to_string()]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Every total shown so far.
    #[must_use]
    pub fn totals(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Total(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// The most recent total.
    #[must_use]
    pub fn last_total(&self) -> Option<i64> {
        self.totals().last().copied()
    }

    /// Every error message shown so far.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// The most recent event listing.
    #[must_use]
    pub fn last_event_list(&self) -> Option<Vec<RecordedEvent>> {
        self.calls().into_iter().rev().find_map(|call| match call {
            SinkCall::EventList(events) => Some(events),
            _ => None,
        })
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PresentationSink for RecordingSink {
    fn set_total(&self, value: i64) {
        self.record(SinkCall::Total(value));
    }

    fn set_error(&self, message: &str) {
        self.record(SinkCall::Error(message.to_string()));
    }

    fn set_event_list(&self, events: &[RecordedEvent]) {
        self.record(SinkCall::EventList(events.to_vec()));
    }
}
