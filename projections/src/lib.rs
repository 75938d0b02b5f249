//! Balance projection for the account balance service.
//!
//! # Overview
//!
//! - [`BalanceProjection`]: subscribes to the account stream, folds CREDIT and
//!   DEBIT events into a balance, and checkpoints after every folded event
//! - [`FileCheckpointStore`]: the checkpoint persisted as `<position>,<value>`
//!   in a local file, replaced atomically on every save
//!
//! # Restart behavior
//!
//! ```text
//! checkpoint (P, V) ──load──▶ subscribe after P ──▶ fold P+1.. ──save──▶ (N, V')
//! ```
//!
//! A restarted projection replays nothing it already folded.

pub mod engine;
pub mod file_checkpoint;

pub use engine::{BalanceProjection, ProjectionError, ProjectionState};
pub use file_checkpoint::FileCheckpointStore;
