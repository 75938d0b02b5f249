//! # Balance Core
//!
//! Core traits and types for a checkpointed, event-sourced account balance.
//!
//! The balance of an account is a projection of one append-only stream of
//! CREDIT and DEBIT events. This crate defines the vocabulary shared by every
//! other crate in the workspace:
//!
//! - [`stream`]: stream names, positions and expected versions
//! - [`event`]: events and the `{"amount":<int>}` payload contract
//! - [`balance`]: the pure fold from events to a balance
//! - [`checkpoint`]: the `(position, value)` checkpoint and its store trait
//! - [`event_store`]: what the core needs from the event log
//! - [`sink`]: where results are reported for display
//!
//! ## Example
//!
//! ```
//! use balance_core::balance::fold_balance;
//! use balance_core::event::{EventData, EventKind, RecordedEvent};
//! use balance_core::stream::{StreamId, Version};
//! use chrono::Utc;
//!
//! let stream = StreamId::new("account-1");
//! let events: Vec<RecordedEvent> = [(EventKind::Credit, 100), (EventKind::Debit, 30)]
//!     .into_iter()
//!     .enumerate()
//!     .map(|(i, (kind, amount))| {
//!         RecordedEvent::from_data(
//!             stream.clone(),
//!             Version::new(i as u64),
//!             EventData::balance(kind, amount).unwrap(),
//!             Utc::now(),
//!         )
//!     })
//!     .collect();
//!
//! assert_eq!(fold_balance(&events), Ok(70));
//! ```

pub mod balance;
pub mod checkpoint;
pub mod event;
pub mod event_store;
pub mod sink;
pub mod stream;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub use balance::FoldError;
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use event::{EventData, EventKind, RecordedEvent};
pub use event_store::{
    EventStore, EventStoreError, EventSubscription, ReadSlice, SubscriptionDropped,
    SubscriptionMessage,
};
pub use sink::PresentationSink;
pub use stream::{ExpectedVersion, StreamCursor, StreamId, Version};
