//! # Balance Runtime
//!
//! Runtime support shared by the projection engine and the application shell.
//!
//! - [`retry`]: bounded retry with fixed or exponential backoff, used for the
//!   startup readiness probe of the event store and for resubscribing after a
//!   dropped subscription

pub mod retry;

pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_backoff, retry_with_predicate};
