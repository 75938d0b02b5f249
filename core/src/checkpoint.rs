//! Checkpoint tracking for the balance projection.
//!
//! A [`Checkpoint`] pairs the position of the last event folded into the
//! balance with the balance at that position. It is what lets a restarted
//! projection resume right after the last applied event instead of replaying
//! the stream.
//!
//! # Ownership
//!
//! Only the projection writes checkpoints. Everyone else (the command gateway
//! in particular) reads them to derive expected versions.
//!
//! # Dyn Compatibility
//!
//! [`CheckpointStore`] uses explicit `Pin<Box<dyn Future>>` returns so it can
//! be shared as `Arc<dyn CheckpointStore>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::stream::Version;

/// Errors that can occur while persisting a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Writing the checkpoint failed. The previous checkpoint is still in place.
    #[error("Failed to write checkpoint {path}: {source}")]
    Write {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Removing the checkpoint failed.
    #[error("Failed to remove checkpoint {path}: {source}")]
    Remove {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Non-filesystem backend error.
    #[error("Checkpoint storage error: {0}")]
    Storage(String),
}

/// Last folded position and the balance at that position.
///
/// # Example
///
/// ```
/// use balance_core::checkpoint::Checkpoint;
/// use balance_core::stream::Version;
///
/// let empty = Checkpoint::empty();
/// assert_eq!(empty.position, None);
/// assert_eq!(empty.value, 0);
///
/// let checkpoint = Checkpoint::at(Version::new(2), 100);
/// assert_eq!(checkpoint.to_string(), "2,100");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Position of the last folded event; `None` if nothing was folded yet.
    pub position: Option<Version>,

    /// Balance after folding everything up to `position`.
    pub value: i64,
}

impl Checkpoint {
    /// The checkpoint of a projection that has not read anything.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            position: None,
            value: 0,
        }
    }

    /// A checkpoint at `position` with balance `value`.
    #[must_use]
    pub const fn at(position: Version, value: i64) -> Self {
        Self {
            position: Some(position),
            value,
        }
    }

    /// Whether this is the empty checkpoint.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position.is_none()
    }

    /// Whether the event at `position` has already been folded.
    ///
    /// ```
    /// use balance_core::checkpoint::Checkpoint;
    /// use balance_core::stream::Version;
    ///
    /// let checkpoint = Checkpoint::at(Version::new(4), 10);
    /// assert!(checkpoint.covers(Version::new(4)));
    /// assert!(!checkpoint.covers(Version::new(5)));
    /// assert!(!Checkpoint::empty().covers(Version::FIRST));
    /// ```
    #[must_use]
    pub fn covers(&self, position: Version) -> bool {
        self.position.is_some_and(|saved| position <= saved)
    }
}

/// Renders the persisted text form, `<position>,<value>`. The empty
/// checkpoint has no text form and renders as an empty string.
impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{position},{}", self.value),
            None => Ok(()),
        }
    }
}

/// Durable storage for the projection checkpoint.
///
/// # Contract
///
/// - `load` never fails: absent or unreadable state is the empty checkpoint
/// - `save` is atomic: a concurrent or later `load` sees the old pair or the
///   new pair, never a mix
/// - `current` answers from memory, without touching storage
pub trait CheckpointStore: Send + Sync {
    /// Read the persisted checkpoint and refresh the in-memory mirror.
    ///
    /// Missing or corrupt state yields [`Checkpoint::empty`].
    fn load(&self) -> Pin<Box<dyn Future<Output = Checkpoint> + Send + '_>>;

    /// Persist `checkpoint` atomically, then update the in-memory mirror.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the write fails; the mirror is left
    /// unchanged in that case.
    fn save(
        &self,
        checkpoint: Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>>;

    /// The last loaded or saved checkpoint.
    fn current(&self) -> Checkpoint;

    /// Delete persisted state and reset the mirror to empty.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the state exists but cannot be removed.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert_eq!(Checkpoint::default(), Checkpoint::empty());
        assert!(Checkpoint::default().is_empty());
    }

    #[test]
    fn negative_values_render() {
        assert_eq!(Checkpoint::at(Version::new(7), -42).to_string(), "7,-42");
    }

    #[test]
    fn empty_renders_nothing() {
        assert_eq!(Checkpoint::empty().to_string(), "");
    }

    #[test]
    fn write_error_display_names_path() {
        let error = CheckpointError::Write {
            path: "/tmp/balance.checkpoint".to_string(),
            source: std::io::Error::other("disk full"),
        };
        let display = format!("{error}");
        assert!(display.contains("/tmp/balance.checkpoint"));
        assert!(display.contains("disk full"));
    }
}
