//! Wiring: store, checkpoint, projection, gateway and controller.

use balance_core::checkpoint::{Checkpoint, CheckpointStore};
use balance_core::event_store::{EventStore, EventStoreError};
use balance_core::sink::PresentationSink;
use balance_core::stream::StreamId;
use balance_projections::{BalanceProjection, FileCheckpointStore, ProjectionError, ProjectionState};
use balance_runtime::retry::{RetryPolicy, retry_with_backoff};
use balance_store::FileEventStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::controller::{CleanError, Controller, Flow};
use crate::gateway::CommandGateway;

/// Errors while starting or stopping the service.
#[derive(Error, Debug)]
pub enum AppError {
    /// The event store could not be opened or never became ready.
    #[error("Event store unavailable: {0}")]
    Store(#[from] EventStoreError),

    /// The projection ended with a fatal error.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// The projection task panicked or was cancelled.
    #[error("Projection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// `clean` could not remove local state.
    #[error(transparent)]
    Clean(#[from] CleanError),

    /// Commands could not be read.
    #[error("Failed to read commands: {0}")]
    Input(#[from] std::io::Error),
}

/// What ended [`App::run`].
enum Ended {
    Input(std::io::Result<Flow>),
    Projection(Result<Result<(), ProjectionError>, tokio::task::JoinError>),
}

/// Probe `store` until it is ready or `policy` runs out.
///
/// # Errors
///
/// Returns the last probe error once all retries are spent.
pub async fn wait_until_ready(store: &dyn EventStore, policy: &RetryPolicy) -> Result<(), EventStoreError> {
    retry_with_backoff(policy, "event store readiness", || store.ensure_ready()).await?;
    tracing::info!("Event store ready");
    Ok(())
}

/// A running service.
pub struct App {
    /// The interactive command loop.
    pub controller: Controller,
    /// Checkpoints as the projection saves them.
    pub checkpoint: watch::Receiver<Checkpoint>,
    /// Lifecycle of the projection.
    pub state: watch::Receiver<ProjectionState>,
    /// `None` once the task has been awaited.
    projection: Option<JoinHandle<Result<(), ProjectionError>>>,
    shutdown: watch::Sender<bool>,
    journal: Option<FileEventStore>,
}

impl App {
    /// Start the projection over `store` and build the command surface.
    ///
    /// # Errors
    ///
    /// [`AppError::Store`] if the store never becomes ready.
    pub async fn start(
        config: &Config,
        store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Self, AppError> {
        Self::launch(config, store, checkpoints, sink, None).await
    }

    /// Open the file journal and checkpoint named in `config` and start.
    ///
    /// # Errors
    ///
    /// [`AppError::Store`] if the journal cannot be opened or never becomes ready.
    pub async fn start_local(config: &Config, sink: Arc<dyn PresentationSink>) -> Result<Self, AppError> {
        let store = FileEventStore::open(&config.event_log_path).await?;
        let checkpoints = Arc::new(FileCheckpointStore::new(config.checkpoint_file.clone()));

        Self::launch(config, Arc::new(store.clone()), checkpoints, sink, Some(store)).await
    }

    // The checkpoint is loaded before the projection is built, so the gateway
    // derives expected versions from it from the first command on.
    async fn launch(
        config: &Config,
        store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn PresentationSink>,
        journal: Option<FileEventStore>,
    ) -> Result<Self, AppError> {
        wait_until_ready(store.as_ref(), &config.startup_policy()).await?;

        let loaded = checkpoints.load().await;
        tracing::info!(checkpoint = %loaded, "Checkpoint loaded");

        let stream_id = StreamId::new(config.stream.clone());
        let (projection, shutdown) = BalanceProjection::new(
            Arc::clone(&store),
            Arc::clone(&checkpoints),
            Arc::clone(&sink),
            stream_id.clone(),
        );
        let mut projection = projection.with_resubscribe_policy(config.resubscribe_policy());

        let gateway = CommandGateway::new(store, stream_id, projection.checkpoint(), config.list_page_size);
        let event_log = journal.as_ref().map(|j| j.path().to_path_buf());
        let controller = Controller::new(gateway, sink, checkpoints, event_log);
        let state = projection.state();
        let checkpoint = projection.checkpoint();

        let handle = tokio::spawn(async move { projection.run().await });

        Ok(Self {
            controller,
            checkpoint,
            state,
            projection: Some(handle),
            shutdown,
            journal,
        })
    }

    /// Run commands from `input` while the projection is alive.
    ///
    /// If the projection ends first, reading stops at once and its fatal
    /// error is returned; commands are not accepted against a balance that no
    /// longer updates.
    ///
    /// # Errors
    ///
    /// - [`AppError::Projection`] if the projection failed
    /// - [`AppError::Input`] if `input` cannot be read
    pub async fn run<R>(&mut self, input: R) -> Result<Flow, AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        let Some(projection) = self.projection.as_mut() else {
            return Ok(Flow::Exit);
        };

        let ended = tokio::select! {
            biased;
            outcome = projection => Ended::Projection(outcome),
            flow = self.controller.run(input) => Ended::Input(flow),
        };

        match ended {
            Ended::Input(flow) => Ok(flow?),
            Ended::Projection(outcome) => {
                self.projection = None;
                outcome??;
                tracing::warn!("Projection stopped while commands were running");
                Ok(Flow::Exit)
            }
        }
    }

    /// Stop the projection, close the store and, for [`Flow::Clean`], delete
    /// local state.
    ///
    /// # Errors
    ///
    /// Returns the projection's fatal error if it ended with one, or a
    /// [`CleanError`] if local state cannot be removed.
    pub async fn shutdown(self, flow: Flow) -> Result<(), AppError> {
        self.shutdown.send(true).ok();
        let outcome = match self.projection {
            Some(projection) => projection.await,
            None => Ok(Ok(())),
        };

        if let Some(journal) = &self.journal {
            journal.close();
        }

        if flow == Flow::Clean {
            self.controller.clean().await?;
            tracing::info!("Local state cleaned");
        }

        outcome??;
        Ok(())
    }
}
