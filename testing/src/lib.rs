//! # Balance Testing
//!
//! Test doubles and helpers for the account balance service.
//!
//! This crate provides:
//! - [`InMemoryCheckpointStore`]: checkpoint storage with save history and
//!   injectable failures
//! - [`RecordingSink`]: a presentation sink that records every call
//! - [`FlakyEventStore`]: wraps a real store and injects readiness failures,
//!   subscribe failures and subscription drops
//! - [`helpers`]: event builders and watch-channel waits
//! - [`properties`]: proptest strategies for balance event sequences
//!
//! ## Example
//!
//! ```ignore
//! use balance_testing::{InMemoryCheckpointStore, RecordingSink, helpers};
//!
//! #[tokio::test]
//! async fn folds_history() {
//!     let store = Arc::new(InMemoryEventStore::new());
//!     let checkpoints = Arc::new(InMemoryCheckpointStore::new());
//!     let sink = Arc::new(RecordingSink::new());
//!
//!     let (mut projection, shutdown) =
//!         BalanceProjection::new(store, checkpoints, sink.clone(), helpers::account());
//!     let mut checkpoint = projection.checkpoint();
//!     tokio::spawn(async move { projection.run().await });
//!
//!     helpers::wait_for(&mut checkpoint, |c| c.value == 100).await;
//! }
//! ```

pub mod flaky_store;
pub mod projection_mocks;

pub use flaky_store::FlakyEventStore;
pub use projection_mocks::{InMemoryCheckpointStore, RecordingSink, SinkCall};

/// Event builders and waits.
pub mod helpers {
    use balance_core::event::{EventData, EventKind, RecordedEvent};
    use balance_core::stream::{StreamId, Version};
    use chrono::{DateTime, Utc};
    use std::time::Duration;
    use tokio::sync::watch;

    /// How long [`wait_for`] waits before giving up.
    pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Stream id used throughout the tests.
    #[must_use]
    pub fn account() -> StreamId {
        StreamId::new("account-balance")
    }

    /// A CREDIT or DEBIT event ready to append.
    ///
    /// # Panics
    ///
    /// Never in practice: an integer payload always encodes.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn balance_event(kind: EventKind, amount: i64) -> EventData {
        EventData::balance(kind, amount).expect("integer payload always encodes")
    }

    /// A CREDIT event ready to append.
    #[must_use]
    pub fn credit(amount: i64) -> EventData {
        balance_event(EventKind::Credit, amount)
    }

    /// A DEBIT event ready to append.
    #[must_use]
    pub fn debit(amount: i64) -> EventData {
        balance_event(EventKind::Debit, amount)
    }

    /// An event with an arbitrary type and raw body, e.g. one the fold rejects.
    #[must_use]
    pub fn raw_event(event_type: &str, data: &[u8]) -> EventData {
        EventData::new(event_type, true, data.to_vec(), Vec::new())
    }

    /// Fixed timestamp for recorded fixtures (2025-01-01 00:00:00 UTC).
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089)
    }

    /// Record `data` at `position` of the test account stream.
    #[must_use]
    pub fn recorded(position: u64, data: EventData) -> RecordedEvent {
        RecordedEvent::from_data(account(), Version::new(position), data, test_time())
    }

    /// Wait until the watched value satisfies `predicate`.
    ///
    /// Returns the matching value, or `None` after [`WAIT_TIMEOUT`] or if the
    /// sender is gone.
    pub async fn wait_for<T, F>(receiver: &mut watch::Receiver<T>, mut predicate: F) -> Option<T>
    where
        T: Clone,
        F: FnMut(&T) -> bool,
    {
        let waited = tokio::time::timeout(WAIT_TIMEOUT, receiver.wait_for(|value| predicate(value))).await;
        match waited {
            Ok(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; output is captured by the test harness.
    pub fn init_tracing() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use balance_core::event::EventKind;
    use proptest::prelude::*;

    /// A CREDIT or DEBIT.
    pub fn event_kind() -> impl Strategy<Value = EventKind> {
        prop_oneof![Just(EventKind::Credit), Just(EventKind::Debit)]
    }

    /// Amounts small enough that no sequence of `max_len` of them overflows.
    pub fn amount() -> impl Strategy<Value = i64> {
        -1_000_000_i64..=1_000_000
    }

    /// A sequence of balance operations of up to `max_len` entries.
    pub fn balance_ops(max_len: usize) -> impl Strategy<Value = Vec<(EventKind, i64)>> {
        prop::collection::vec((event_kind(), amount()), 0..=max_len)
    }

    /// Expected balance of `ops`: credits minus debits.
    #[must_use]
    pub fn expected_balance(ops: &[(EventKind, i64)]) -> i64 {
        ops.iter()
            .map(|(kind, amount)| match kind {
                EventKind::Credit => *amount,
                EventKind::Debit => -amount,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::helpers;
    use super::properties::expected_balance;
    use balance_core::event::EventKind;

    #[test]
    fn test_time_is_new_year_2025() {
        assert_eq!(helpers::test_time().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn recorded_fixture_lands_on_the_account_stream() {
        let event = helpers::recorded(3, helpers::debit(7));
        assert_eq!(event.stream_id, helpers::account());
        assert_eq!(event.position.value(), 3);
        assert_eq!(event.amount(), Ok(7));
    }

    #[test]
    fn expected_balance_subtracts_debits() {
        let ops = [(EventKind::Credit, 100), (EventKind::Debit, 30), (EventKind::Debit, -5)];
        assert_eq!(expected_balance(&ops), 75);
    }
}
