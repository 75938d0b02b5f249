//! Interactive command loop.
//!
//! Reads one command per line, runs it through the [`CommandGateway`] and
//! reports failures to the presentation sink. Nothing here touches the
//! balance: totals only ever come from the projection.

use balance_core::checkpoint::{CheckpointError, CheckpointStore};
use balance_core::sink::PresentationSink;
use balance_core::stream::Version;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::command::Command;
use crate::gateway::CommandGateway;

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next command.
    Continue,
    /// Stop.
    Exit,
    /// Stop and delete local state.
    Clean,
}

/// Errors while deleting local state.
#[derive(Error, Debug)]
pub enum CleanError {
    /// The checkpoint could not be removed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The local event log could not be removed.
    #[error("Failed to remove event log {path}: {source}")]
    EventLog {
        /// Journal path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Dispatches parsed commands to the gateway.
pub struct Controller {
    gateway: CommandGateway,
    sink: Arc<dyn PresentationSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    event_log: Option<PathBuf>,
}

impl Controller {
    /// Create a controller.
    ///
    /// `event_log` is the journal removed by `clean`, if there is one.
    #[must_use]
    pub fn new(
        gateway: CommandGateway,
        sink: Arc<dyn PresentationSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        event_log: Option<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            sink,
            checkpoints,
            event_log,
        }
    }

    /// The gateway commands go through.
    #[must_use]
    pub const fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    /// Read and run commands until `exit`, `clean` or end of input.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if `input` cannot be read.
    pub async fn run<R>(&self, input: R) -> std::io::Result<Flow>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            match self.handle_line(&line).await {
                Flow::Continue => {}
                flow => return Ok(flow),
            }
        }

        tracing::info!("End of input");
        Ok(Flow::Exit)
    }

    /// Parse and run one command line.
    pub async fn handle_line(&self, line: &str) -> Flow {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command).await,
            Err(e) => {
                self.sink.set_error(&e.to_string());
                Flow::Continue
            }
        }
    }

    /// Run one command.
    pub async fn execute(&self, command: Command) -> Flow {
        tracing::debug!(?command, "Executing command");

        let outcome = match command {
            Command::Exit => return Flow::Exit,
            Command::Clean => return Flow::Clean,
            Command::Redraw => {
                self.sink.set_total(self.gateway.checkpoint().value);
                return Flow::Continue;
            }
            Command::List | Command::ReverseList => self
                .gateway
                .list(command == Command::ReverseList)
                .await
                .map(|events| self.sink.set_event_list(&events)),
            Command::Credit(amount) => self.gateway.credit(amount).await.map(drop),
            Command::Debit(amount) => self.gateway.debit(amount).await.map(drop),
            Command::RepeatAt(position) => self.gateway.repeat_at(Version::new(position)).await.map(drop),
            Command::RepeatLast => self.gateway.repeat_last().await.map(drop),
            Command::Undo => self.gateway.undo_last().await.map(drop),
        };

        if let Err(e) = outcome {
            self.sink.set_error(&e.to_string());
        }
        Flow::Continue
    }

    /// Delete the checkpoint and the local event log.
    ///
    /// Call once the projection has stopped and the store is closed.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError`] if either cannot be removed. A missing file is
    /// not an error.
    pub async fn clean(&self) -> Result<(), CleanError> {
        self.checkpoints.clear().await?;

        if let Some(path) = &self.event_log {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::info!(path = %path.display(), "Event log removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CleanError::EventLog {
                        path: path.display().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }
}
