//! Append-only JSON-lines journal backing [`FileEventStore`](crate::FileEventStore).
//!
//! Storage format: one JSON-encoded [`RecordedEvent`] per line.
//!
//! Rules:
//!   - Strict append only: no mutation, no deletion, no reordering
//!   - fsync after every append
//!   - A torn final line (crash during a write) is cut off on open; any other
//!     unreadable line is an error
//!   - A failed append is rolled back to the previous length; if that fails
//!     too, the journal refuses further appends
//!   - Positions within a stream are contiguous from 0; a gap or repeat is an
//!     error on open

use balance_core::event::RecordedEvent;
use balance_core::event_store::EventStoreError;
use balance_core::stream::{StreamId, Version};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub(crate) struct Journal {
    path: PathBuf,
    file: File,
    poisoned: bool,
}

impl Journal {
    /// Open or create the journal at `path` and return the events it holds.
    pub(crate) async fn open(path: &Path) -> Result<(Self, Vec<RecordedEvent>), EventStoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_error(path, &e)),
        };

        let (events, valid_len) = parse(path, &contents)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| io_error(path, &e))?;

        if valid_len < contents.len() {
            tracing::warn!(
                path = %path.display(),
                kept_bytes = valid_len,
                dropped_bytes = contents.len() - valid_len,
                "Cutting off torn journal tail"
            );
            file.set_len(valid_len as u64)
                .await
                .map_err(|e| io_error(path, &e))?;
        }

        tracing::info!(path = %path.display(), events = events.len(), "Opened event journal");

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                poisoned: false,
            },
            events,
        ))
    }

    /// Append `events` and sync them to disk.
    ///
    /// On failure the file is cut back to its length before the call, so a
    /// partial line never precedes the next entry.
    pub(crate) async fn append(&mut self, events: &[RecordedEvent]) -> Result<(), EventStoreError> {
        if self.poisoned {
            return Err(EventStoreError::Io(format!(
                "{}: journal refuses appends after a failed rollback",
                self.path.display()
            )));
        }

        let mut buffer = Vec::new();
        for event in events {
            serde_json::to_writer(&mut buffer, event)
                .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
            buffer.push(b'\n');
        }

        let len = self
            .file
            .metadata()
            .await
            .map_err(|e| io_error(&self.path, &e))?
            .len();

        let written = match self.file.write_all(&buffer).await {
            Ok(()) => self.file.sync_data().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            tracing::error!(path = %self.path.display(), error = %e, "Journal append failed, rolling back");
            self.rollback(len).await;
            return Err(io_error(&self.path, &e));
        }
        Ok(())
    }

    /// Cut the file back to `len` bytes. Poisons the journal if that fails.
    async fn rollback(&mut self, len: u64) {
        let truncated = match self.file.set_len(len).await {
            Ok(()) => self.file.sync_data().await,
            Err(e) => Err(e),
        };

        if let Err(e) = truncated {
            tracing::error!(path = %self.path.display(), error = %e, "Journal rollback failed");
            self.poisoned = true;
        }
    }
}

/// Parse journal contents. Returns the events and the byte length of the valid prefix.
fn parse(path: &Path, contents: &str) -> Result<(Vec<RecordedEvent>, usize), EventStoreError> {
    let mut events = Vec::new();
    let mut next: HashMap<StreamId, Version> = HashMap::new();
    let mut offset = 0;

    for line in contents.split_inclusive('\n') {
        let complete = line.ends_with('\n');
        let trimmed = line.trim();

        if !trimmed.is_empty() {
            match serde_json::from_str::<RecordedEvent>(trimmed) {
                Ok(event) => {
                    let expected = next.entry(event.stream_id.clone()).or_insert(Version::FIRST);
                    if event.position != *expected {
                        return Err(EventStoreError::Serialization(format!(
                            "{}: entry at byte {offset} has position {} in {}, expected {}",
                            path.display(),
                            event.position,
                            event.stream_id,
                            expected
                        )));
                    }
                    *expected = expected.next();
                    events.push(event);
                }
                Err(_) if !complete => break,
                Err(e) => {
                    return Err(EventStoreError::Serialization(format!(
                        "{}: corrupt journal entry at byte {offset}: {e}",
                        path.display()
                    )));
                }
            }
        }

        if !complete {
            // A final entry without its newline was never acknowledged.
            break;
        }
        offset += line.len();
    }

    Ok((events, offset))
}

fn io_error(path: &Path, error: &std::io::Error) -> EventStoreError {
    EventStoreError::Io(format!("{}: {error}", path.display()))
}
