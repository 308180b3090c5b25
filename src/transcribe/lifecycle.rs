use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::FileError;
use crate::transcribe::backend::{FileRef, JobStatus, RemoteTranscriptionBackend};
use crate::transcribe::descriptor::AudioDescriptor;

/// Polling cadence and bounds for a single remote job.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub poll_interval: Duration,
    /// Upper bound on submit-to-result time. `None` polls until terminal.
    pub job_timeout: Option<Duration>,
    /// Transient poll failures tolerated in a row before the file fails.
    pub max_consecutive_poll_errors: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            job_timeout: None,
            max_consecutive_poll_errors: 3,
        }
    }
}

/// One remote job, owned by the task processing its source file.
#[derive(Debug)]
pub struct TranscriptionJob {
    pub source: PathBuf,
    pub job_id: String,
    pub status: JobStatus,
    pub result_text: Option<String>,
}

impl TranscriptionJob {
    fn submitted(source: &Path, job_id: String) -> Self {
        Self {
            source: source.to_path_buf(),
            job_id,
            status: JobStatus::Submitted,
            result_text: None,
        }
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Submit, poll until terminal, then fetch and parse the transcript.
#[derive(Debug, Clone, Default)]
pub struct JobLifecycle {
    config: LifecycleConfig,
}

impl JobLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Drive one file through the backend. Returns the finished job with
    /// its transcript on success.
    pub async fn run(
        &self,
        path: &Path,
        backend: &dyn RemoteTranscriptionBackend,
        file: &FileRef,
        descriptor: &AudioDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionJob, FileError> {
        let job_id = or_cancel(cancel, backend.submit(file, descriptor))
            .await
            .ok_or(FileError::Cancelled { job_id: None })?
            .map_err(FileError::Submission)?;

        tracing::info!(
            backend = %backend.kind(),
            job_id = %job_id,
            file = %path.display(),
            "Job submitted"
        );

        let mut job = TranscriptionJob::submitted(path, job_id.clone());
        let outcome = match self.config.job_timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive(&mut job, backend, cancel))
                .await
                .unwrap_or_else(|_| {
                    Err(FileError::TimedOut {
                        job_id,
                        after: limit,
                    })
                }),
            None => self.drive(&mut job, backend, cancel).await,
        };

        outcome.map(|()| job)
    }

    async fn drive(
        &self,
        job: &mut TranscriptionJob,
        backend: &dyn RemoteTranscriptionBackend,
        cancel: &CancellationToken,
    ) -> Result<(), FileError> {
        let job_id = job.job_id.clone();
        let cancelled = || FileError::Cancelled {
            job_id: Some(job_id.clone()),
        };
        let mut poll_errors = 0u32;

        loop {
            let observed = or_cancel(cancel, backend.poll(&job.job_id))
                .await
                .ok_or_else(cancelled)?;

            match observed {
                Ok(status) => {
                    poll_errors = 0;
                    let next = job.status.advance(status);
                    if next != job.status {
                        tracing::debug!(
                            job_id = %job.job_id,
                            file = %job.source.display(),
                            status = %next,
                            "Job status changed"
                        );
                    }
                    job.status = next;
                }
                Err(e) => {
                    poll_errors += 1;
                    if poll_errors > self.config.max_consecutive_poll_errors {
                        return Err(FileError::Poll {
                            job_id: job.job_id.clone(),
                            source: e,
                        });
                    }
                    tracing::warn!(
                        job_id = %job.job_id,
                        file = %job.source.display(),
                        attempt = poll_errors,
                        "Poll failed, retrying: {}",
                        e
                    );
                }
            }

            match &job.status {
                JobStatus::Completed => break,
                JobStatus::Failed { reason } => {
                    return Err(FileError::TranscriptionJobFailed {
                        job_id: job.job_id.clone(),
                        reason: reason.clone(),
                    });
                }
                JobStatus::Submitted | JobStatus::Running => {}
            }

            or_cancel(cancel, tokio::time::sleep(self.config.poll_interval))
                .await
                .ok_or_else(cancelled)?;
        }

        let payload = or_cancel(cancel, backend.fetch_result(&job.job_id))
            .await
            .ok_or_else(cancelled)?
            .map_err(|source| FileError::Fetch {
                job_id: job.job_id.clone(),
                source,
            })?;

        let text = backend
            .parse_transcript(&payload)
            .map_err(|message| FileError::ResultParse {
                job_id: job.job_id.clone(),
                message,
            })?;

        job.result_text = Some(text);
        Ok(())
    }
}
