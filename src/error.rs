use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::transcribe::backend::BackendKind;
use crate::transcribe::descriptor::UnsupportedFormat;

/// Failures while turning configuration into a backend handle.
///
/// Both variants are batch-fatal: without a backend no file can proceed.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("credentials for the {kind} backend are missing or incomplete: {reason}")]
    CredentialResolution { kind: BackendKind, reason: String },

    #[error("failed to initialize the {kind} backend: {reason}")]
    BackendInitialization { kind: BackendKind, reason: String },
}

/// Transport-level failure reported by a remote backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request signing failed: {0}")]
    Signing(String),
}

/// Why a single file did not produce a transcript.
///
/// These never escape the file's own task; the dispatcher records them as
/// that file's outcome.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("unsupported format for {}: {reason}", .path.display())]
    UnsupportedFormat {
        path: PathBuf,
        reason: UnsupportedFormat,
    },

    #[error("failed to stage {} remotely: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("job submission failed: {0}")]
    Submission(#[source] BackendError),

    #[error("polling job {job_id} failed: {source}")]
    Poll {
        job_id: String,
        #[source]
        source: BackendError,
    },

    #[error("transcription job {job_id} failed: {reason}")]
    TranscriptionJobFailed { job_id: String, reason: String },

    #[error("fetching result of job {job_id} failed: {source}")]
    Fetch {
        job_id: String,
        #[source]
        source: BackendError,
    },

    #[error("could not parse result of job {job_id}: {message}")]
    ResultParse { job_id: String, message: String },

    #[error("job {job_id} did not finish within {after:?}")]
    TimedOut { job_id: String, after: Duration },

    #[error("cancelled{}", .job_id.as_deref().map(|id| format!(" (job {})", id)).unwrap_or_default())]
    Cancelled { job_id: Option<String> },

    #[error("failed to write transcript {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// The backend job id attached to this failure, if one was assigned.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Poll { job_id, .. }
            | Self::TranscriptionJobFailed { job_id, .. }
            | Self::Fetch { job_id, .. }
            | Self::ResultParse { job_id, .. }
            | Self::TimedOut { job_id, .. } => Some(job_id),
            Self::Cancelled { job_id } => job_id.as_deref(),
            _ => None,
        }
    }
}

/// Failures that stop a whole batch before any file outcome exists.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to create scratch container for the {kind} backend: {source}")]
    ContainerSetup {
        kind: BackendKind,
        #[source]
        source: BackendError,
    },
}

#[derive(Error, Debug)]
pub enum FacadeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("transcript destination is not an existing directory: {}", .0.display())]
    InvalidDestination(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message_includes_job_id() {
        let err = FileError::Cancelled {
            job_id: Some("job-7".to_string()),
        };
        assert_eq!(err.to_string(), "cancelled (job job-7)");
        assert_eq!(FileError::Cancelled { job_id: None }.to_string(), "cancelled");
    }

    #[test]
    fn test_job_id_accessor() {
        let err = FileError::TranscriptionJobFailed {
            job_id: "abc".to_string(),
            reason: "bad audio".to_string(),
        };
        assert_eq!(err.job_id(), Some("abc"));
        let err = FileError::Submission(BackendError::Protocol("quota".to_string()));
        assert_eq!(err.job_id(), None);
    }

    #[test]
    fn test_registry_error_names_backend() {
        let err = RegistryError::CredentialResolution {
            kind: BackendKind::Ibm,
            reason: "missing [backends.ibm] section".to_string(),
        };
        assert!(err.to_string().contains("ibm"));
    }
}
