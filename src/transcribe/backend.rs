use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::transcribe::descriptor::AudioDescriptor;

/// The remote speech providers a facade can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Aws,
    Google,
    Ibm,
    Azure,
    #[serde(rename = "azureadv")]
    #[value(name = "azureadv")]
    AzureAdvanced,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Aws,
        BackendKind::Google,
        BackendKind::Ibm,
        BackendKind::Azure,
        BackendKind::AzureAdvanced,
    ];

    /// Prefix used for transcript filenames and on the command line.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Google => "google",
            Self::Ibm => "ibm",
            Self::Azure => "azure",
            Self::AzureAdvanced => "azureadv",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.prefix().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transcription backend: {}", s))
    }
}

/// Remote job status as reported by a backend poll.
///
/// Transitions are monotonic: `Submitted -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Running,
    Completed,
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed { .. } => 2,
        }
    }

    /// Fold a freshly observed status into the current one without ever
    /// moving backwards. Terminal states absorb everything.
    pub fn advance(&self, observed: JobStatus) -> JobStatus {
        if self.is_terminal() || observed.rank() < self.rank() {
            return self.clone();
        }
        observed
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Where a backend finds the audio for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// Sent inline from local disk at submission time.
    Local(PathBuf),
    /// Staged in the backend's scratch container.
    Remote { key: String, uri: String },
}

impl FileRef {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote { .. } => None,
        }
    }
}

/// How the sample rate of a container is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProbe {
    /// RIFF/WAVE header.
    Wav,
    /// Any container the demuxer probe recognizes.
    Container,
    /// Headerless PCM; the rate is assumed.
    Raw { assumed_rate_hz: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub extension: &'static str,
    pub codec_tag: &'static str,
    pub probe: HeaderProbe,
}

/// Inclusive range of sample rates a backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRateRange {
    pub min_hz: u32,
    pub max_hz: u32,
}

impl SampleRateRange {
    pub const fn new(min_hz: u32, max_hz: u32) -> Self {
        Self { min_hz, max_hz }
    }

    pub fn accepts(&self, rate_hz: u32) -> bool {
        !(rate_hz < self.min_hz || rate_hz > self.max_hz)
    }
}

/// Everything a backend accepts as input.
#[derive(Debug, Clone, Copy)]
pub struct FormatTable {
    pub formats: &'static [FormatSpec],
    pub sample_rates: SampleRateRange,
}

impl FormatTable {
    pub fn lookup(&self, extension: &str) -> Option<&FormatSpec> {
        self.formats
            .iter()
            .find(|f| f.extension.eq_ignore_ascii_case(extension))
    }

    pub fn extensions(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.extension).collect()
    }
}

/// Transport for one remote speech provider.
///
/// The staging hooks default to no-ops so that backends which accept the
/// audio inline only implement submit/poll/fetch.
#[async_trait]
pub trait RemoteTranscriptionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn formats(&self) -> &FormatTable;

    /// Whether this backend owns a scratch container for the whole batch.
    fn uses_container(&self) -> bool {
        false
    }

    async fn create_container(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete_container(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn upload_file(&self, path: &Path) -> Result<FileRef, BackendError> {
        Ok(FileRef::Local(path.to_path_buf()))
    }

    async fn delete_file(&self, _file: &FileRef, _job_id: Option<&str>) -> Result<(), BackendError> {
        Ok(())
    }

    /// Start a job and return the backend's job identifier.
    async fn submit(
        &self,
        file: &FileRef,
        descriptor: &AudioDescriptor,
    ) -> Result<String, BackendError>;

    async fn poll(&self, job_id: &str) -> Result<JobStatus, BackendError>;

    /// Retrieve the raw result document of a completed job.
    async fn fetch_result(&self, job_id: &str) -> Result<String, BackendError>;

    /// Extract plain transcript text from a result document.
    fn parse_transcript(&self, payload: &str) -> Result<String, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_and_display() {
        for kind in BackendKind::ALL {
            let parsed: BackendKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!("AzureAdv".parse::<BackendKind>(), Ok(BackendKind::AzureAdvanced));
        assert!("whisper".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_kind_serde_uses_prefix() {
        let json = serde_json::to_string(&BackendKind::AzureAdvanced).unwrap();
        assert_eq!(json, "\"azureadv\"");
        let kind: BackendKind = serde_json::from_str("\"ibm\"").unwrap();
        assert_eq!(kind, BackendKind::Ibm);
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let running = JobStatus::Submitted.advance(JobStatus::Running);
        assert_eq!(running, JobStatus::Running);
        assert_eq!(running.advance(JobStatus::Submitted), JobStatus::Running);

        let done = running.advance(JobStatus::Completed);
        assert_eq!(
            done.advance(JobStatus::Failed {
                reason: "late".to_string()
            }),
            JobStatus::Completed
        );
    }

    #[test]
    fn test_sample_rate_bounds_are_inclusive() {
        let range = SampleRateRange::new(8000, 48000);
        assert!(range.accepts(8000));
        assert!(range.accepts(48000));
        assert!(range.accepts(16000));
        assert!(!range.accepts(7999));
        assert!(!range.accepts(48001));
    }

    #[test]
    fn test_format_lookup_is_case_insensitive() {
        const FORMATS: &[FormatSpec] = &[FormatSpec {
            extension: "wav",
            codec_tag: "wav",
            probe: HeaderProbe::Wav,
        }];
        let table = FormatTable {
            formats: FORMATS,
            sample_rates: SampleRateRange::new(8000, 48000),
        };
        assert!(table.lookup("WAV").is_some());
        assert!(table.lookup("mp3").is_none());
        assert_eq!(table.extensions(), vec!["wav"]);
    }
}
