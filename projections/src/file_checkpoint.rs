//! File-backed checkpoint store.
//!
//! # File format
//!
//! A single line `<position>,<value>`, e.g. `2,100`. Surrounding whitespace is
//! tolerated; anything else (missing field, extra field, non-numeric field)
//! makes the file unreadable and [`load`](CheckpointStore::load) falls back to
//! the empty checkpoint.
//!
//! # Atomicity
//!
//! A save writes `<file>.tmp`, syncs it, then renames it over `<file>`.
//! Readers only ever see the old or the new pair. A leftover `.tmp` from an
//! interrupted save is never read.

use balance_core::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use balance_core::stream::Version;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};
use tokio::io::AsyncWriteExt;

/// Checkpoint persisted as `<position>,<value>` in a local file.
///
/// # Example
///
/// ```no_run
/// use balance_core::checkpoint::{Checkpoint, CheckpointStore};
/// use balance_core::stream::Version;
/// use balance_projections::FileCheckpointStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FileCheckpointStore::new("balance.checkpoint");
/// store.save(Checkpoint::at(Version::new(2), 100)).await?;
///
/// assert_eq!(store.load().await, Checkpoint::at(Version::new(2), 100));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    mirror: RwLock<Checkpoint>,
}

impl FileCheckpointStore {
    /// Create a store for `path`. Nothing is read until [`load`](CheckpointStore::load).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mirror: RwLock::new(Checkpoint::empty()),
        }
    }

    /// Location of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn set_mirror(&self, checkpoint: Checkpoint) {
        *self.mirror.write().unwrap_or_else(PoisonError::into_inner) = checkpoint;
    }

    fn write_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Write {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn write_atomically(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.write_error(e))?;
        file.write_all(checkpoint.to_string().as_bytes())
            .await
            .map_err(|e| self.write_error(e))?;
        file.sync_all().await.map_err(|e| self.write_error(e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.write_error(e))
    }
}

/// Parse `<position>,<value>`. `None` for anything else.
///
/// ```
/// use balance_core::checkpoint::Checkpoint;
/// use balance_core::stream::Version;
/// use balance_projections::file_checkpoint::parse_checkpoint;
///
/// assert_eq!(parse_checkpoint(" 3,-20\n"), Some(Checkpoint::at(Version::new(3), -20)));
/// assert_eq!(parse_checkpoint("3"), None);
/// assert_eq!(parse_checkpoint("3,4,5"), None);
/// assert_eq!(parse_checkpoint("x,4"), None);
/// ```
#[must_use]
pub fn parse_checkpoint(text: &str) -> Option<Checkpoint> {
    let (position, value) = text.trim().split_once(',')?;
    let position: u64 = position.trim().parse().ok()?;
    let value: i64 = value.trim().parse().ok()?;
    Some(Checkpoint::at(Version::new(position), value))
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Checkpoint> + Send + '_>> {
        Box::pin(async move {
            let checkpoint = match tokio::fs::read_to_string(&self.path).await {
                Ok(text) => parse_checkpoint(&text).unwrap_or_else(|| {
                    tracing::warn!(
                        path = %self.path.display(),
                        contents = %text.trim(),
                        "Unreadable checkpoint, starting from the beginning"
                    );
                    Checkpoint::empty()
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %self.path.display(), "No checkpoint file");
                    Checkpoint::empty()
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to read checkpoint, starting from the beginning"
                    );
                    Checkpoint::empty()
                }
            };

            self.set_mirror(checkpoint);
            checkpoint
        })
    }

    fn save(
        &self,
        checkpoint: Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            self.write_atomically(checkpoint).await?;
            self.set_mirror(checkpoint);
            Ok(())
        })
    }

    fn current(&self) -> Checkpoint {
        *self.mirror.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            for path in [self.path.clone(), self.temp_path()] {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(CheckpointError::Remove {
                            path: path.display().to_string(),
                            source,
                        });
                    }
                }
            }

            self.set_mirror(Checkpoint::empty());
            tracing::info!(path = %self.path.display(), "Checkpoint cleared");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_wrong_field_count() {
        assert_eq!(parse_checkpoint(""), None);
        assert_eq!(parse_checkpoint(","), None);
        assert_eq!(parse_checkpoint("1,2,"), None);
    }

    #[test]
    fn parse_rejects_negative_position() {
        assert_eq!(parse_checkpoint("-1,5"), None);
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let store = FileCheckpointStore::new("/var/lib/balance.checkpoint");
        assert_eq!(store.temp_path(), PathBuf::from("/var/lib/balance.checkpoint.tmp"));
    }
}
