//! # Balance Store
//!
//! [`EventStore`](balance_core::event_store::EventStore) implementations for
//! the account balance service.
//!
//! - [`InMemoryEventStore`]: volatile, for tests and demos
//! - [`FileEventStore`]: journaled to a JSON-lines file, synced on every append
//!
//! Both enforce expected-version checks atomically with the write, assign
//! contiguous 0-based positions, and serve catch-up subscriptions that
//! deliver history, a `CaughtUp` marker, and then live appends.

mod file;
mod journal;
mod log;
mod memory;

pub use file::FileEventStore;
pub use memory::InMemoryEventStore;
