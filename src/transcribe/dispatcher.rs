use std::path::{Path, PathBuf};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{BatchError, FileError};
use crate::transcribe::backend::{BackendKind, RemoteTranscriptionBackend};
use crate::transcribe::descriptor::describe_file;
use crate::transcribe::lifecycle::{or_cancel, JobLifecycle};
use crate::transcribe::sink::TranscriptSink;

pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// What happened to one input file.
#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    /// Path of the written transcript, or why there is none.
    pub result: Result<PathBuf, FileError>,
}

/// Full accounting of one dispatcher run.
#[derive(Debug)]
pub struct BatchReport {
    pub backend: BackendKind,
    pub chunks: usize,
    /// Completion order within a chunk, chunk order across chunks.
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn outcome_for(&self, source: &Path) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Fans files out to a backend in fixed-size chunks.
///
/// Scheduling is a strict chunk barrier, not a sliding window: every file of
/// chunk N reaches a terminal outcome before any file of chunk N+1 starts.
/// This caps concurrent remote jobs (and poll loops) at `chunk_size`, at the
/// cost of a slow file holding back the next chunk.
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    chunk_size: usize,
    lifecycle: JobLifecycle,
}

impl Default for BatchDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, JobLifecycle::default())
    }
}

impl BatchDispatcher {
    pub fn new(chunk_size: usize, lifecycle: JobLifecycle) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            lifecycle,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Transcribe `paths` in order, chunk by chunk.
    ///
    /// Per-file failures land in the report. Only failing to set up the
    /// backend's scratch container aborts the run, and it does so before any
    /// file is touched.
    pub async fn run(
        &self,
        paths: &[PathBuf],
        backend: &dyn RemoteTranscriptionBackend,
        sink: &TranscriptSink,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let kind = backend.kind();
        let mut report = BatchReport {
            backend: kind,
            chunks: 0,
            outcomes: Vec::with_capacity(paths.len()),
        };

        if paths.is_empty() {
            return Ok(report);
        }

        if backend.uses_container() {
            backend
                .create_container()
                .await
                .map_err(|source| BatchError::ContainerSetup { kind, source })?;
            tracing::debug!(backend = %kind, "Scratch container created");
        }

        let total_chunks = paths.len().div_ceil(self.chunk_size);
        for chunk in paths.chunks(self.chunk_size) {
            report.chunks += 1;
            tracing::info!(
                "Starting chunk {}/{} ({} files) on {}",
                report.chunks,
                total_chunks,
                chunk.len(),
                kind
            );

            let mut in_flight: FuturesUnordered<_> = chunk
                .iter()
                .map(|path| self.process_file(path, backend, sink, cancel))
                .collect();

            while let Some(outcome) = in_flight.next().await {
                report.outcomes.push(outcome);
            }
        }

        if backend.uses_container() {
            if let Err(e) = backend.delete_container().await {
                tracing::warn!(backend = %kind, "Failed to delete scratch container: {}", e);
            }
        }

        let failed = report.failed().count();
        tracing::info!(
            "Batch finished on {}: {} succeeded, {} failed",
            kind,
            report.outcomes.len() - failed,
            failed
        );
        Ok(report)
    }

    async fn process_file(
        &self,
        path: &Path,
        backend: &dyn RemoteTranscriptionBackend,
        sink: &TranscriptSink,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let result = self.transcribe_file(path, backend, sink, cancel).await;
        match &result {
            Ok(output) => tracing::info!("Transcribed: {} -> {}", path.display(), output.display()),
            Err(e) => tracing::error!("Failed to transcribe {}: {}", path.display(), e),
        }
        FileOutcome {
            source: path.to_path_buf(),
            result,
        }
    }

    async fn transcribe_file(
        &self,
        path: &Path,
        backend: &dyn RemoteTranscriptionBackend,
        sink: &TranscriptSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FileError> {
        if cancel.is_cancelled() {
            return Err(FileError::Cancelled { job_id: None });
        }

        let descriptor = describe_file(path, *backend.formats())
            .await
            .map_err(|reason| FileError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason,
            })?;

        let file = or_cancel(cancel, backend.upload_file(path))
            .await
            .ok_or(FileError::Cancelled { job_id: None })?
            .map_err(|source| FileError::Staging {
                path: path.to_path_buf(),
                source,
            })?;

        let job = self
            .lifecycle
            .run(path, backend, &file, &descriptor, cancel)
            .await;

        // The remote copy goes away whatever the job's fate.
        let job_id = match &job {
            Ok(job) => Some(job.job_id.as_str()),
            Err(e) => e.job_id(),
        };
        if let Err(e) = backend.delete_file(&file, job_id).await {
            tracing::warn!("Failed to clean up remote copy of {}: {}", path.display(), e);
        }

        let job = job?;
        sink.write(
            backend.kind(),
            path,
            job.result_text.as_deref().unwrap_or_default(),
        )
        .await
    }
}
