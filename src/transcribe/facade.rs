use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::FacadeError;
use crate::transcribe::backend::{BackendKind, RemoteTranscriptionBackend};
use crate::transcribe::dispatcher::{BatchDispatcher, BatchReport};
use crate::transcribe::lifecycle::JobLifecycle;
use crate::transcribe::registry::{BackendRegistry, BackendResolver};
use crate::transcribe::sink::TranscriptSink;

/// Entry point for callers: one active backend, one destination directory.
///
/// Batches on the same facade run one at a time.
pub struct TranscriptionFacade {
    resolver: Box<dyn BackendResolver>,
    kind: BackendKind,
    backend: Arc<dyn RemoteTranscriptionBackend>,
    destination: PathBuf,
    dispatcher: BatchDispatcher,
    run_lock: tokio::sync::Mutex<()>,
}

impl TranscriptionFacade {
    pub fn new(
        resolver: impl BackendResolver + 'static,
        kind: BackendKind,
        destination: impl Into<PathBuf>,
        dispatcher: BatchDispatcher,
    ) -> Result<Self, FacadeError> {
        let backend = resolver.resolve(kind)?;
        Ok(Self {
            resolver: Box::new(resolver),
            kind,
            backend,
            destination: destination.into(),
            dispatcher,
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Facade over the real providers, using the configured default backend.
    pub fn from_config(config: &Config) -> Result<Self, FacadeError> {
        let dispatcher = BatchDispatcher::new(
            config.dispatch.chunk_size,
            JobLifecycle::new(config.dispatch.lifecycle()),
        );
        Self::new(
            BackendRegistry::from_config(config),
            config.transcription.backend,
            config.output.directory.clone(),
            dispatcher,
        )
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Point subsequent batches at an existing directory.
    pub fn set_destination(&mut self, path: impl Into<PathBuf>) -> Result<(), FacadeError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(FacadeError::InvalidDestination(path));
        }
        self.destination = path;
        Ok(())
    }

    /// Replace the active backend. The destination is kept; on failure the
    /// previous backend stays active.
    pub fn swap_backend(&mut self, kind: BackendKind) -> Result<(), FacadeError> {
        let backend = self.resolver.resolve(kind)?;
        tracing::info!("Switched backend {} -> {}", self.kind, kind);
        self.backend = backend;
        self.kind = kind;
        Ok(())
    }

    pub async fn transcribe<I, P>(&self, paths: I) -> Result<BatchReport, FacadeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.transcribe_with_cancel(paths, &CancellationToken::new())
            .await
    }

    /// Transcribe `paths` with the active backend; cancelling `cancel` stops
    /// in-flight jobs and fails the files that have not finished.
    pub async fn transcribe_with_cancel<I, P>(
        &self,
        paths: I,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, FacadeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        let _running = self.run_lock.lock().await;

        let sink = TranscriptSink::new(self.destination.clone());
        tracing::info!(
            "Transcribing {} files with {} into {}",
            paths.len(),
            self.kind,
            self.destination.display()
        );
        let report = self
            .dispatcher
            .run(&paths, self.backend.as_ref(), &sink, cancel)
            .await?;
        Ok(report)
    }
}
