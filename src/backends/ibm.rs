//! IBM Watson Speech to Text asynchronous recognitions. Audio goes up in the
//! submit request body; there is no staging.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use super::{check_status, read_local};
use crate::error::BackendError;
use crate::transcribe::backend::{
    BackendKind, FileRef, FormatSpec, FormatTable, HeaderProbe, JobStatus, RemoteTranscriptionBackend,
    SampleRateRange,
};
use crate::transcribe::descriptor::AudioDescriptor;

pub(crate) const FORMATS: FormatTable = FormatTable {
    formats: &[
        FormatSpec { extension: "wav", codec_tag: "audio/wav", probe: HeaderProbe::Wav },
        FormatSpec { extension: "mp3", codec_tag: "audio/mp3", probe: HeaderProbe::Container },
        FormatSpec { extension: "flac", codec_tag: "audio/flac", probe: HeaderProbe::Container },
        FormatSpec { extension: "ogg", codec_tag: "audio/ogg", probe: HeaderProbe::Container },
        FormatSpec {
            extension: "pcm",
            codec_tag: "audio/l16",
            probe: HeaderProbe::Raw { assumed_rate_hz: 16_000 },
        },
        FormatSpec { extension: "mkv", codec_tag: "audio/webm", probe: HeaderProbe::Container },
    ],
    sample_rates: SampleRateRange::new(8_000, 48_000),
};

#[derive(Debug, Deserialize)]
struct Recognition {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct RecognitionResults {
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    results: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

pub struct IbmBackend {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
    language: String,
}

impl IbmBackend {
    pub fn new(client: reqwest::Client, base_url: &str, username: &str, password: &str, language: String) -> Self {
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: format!("Basic {}", credentials),
            language,
        }
    }

    fn recognitions_url(&self) -> String {
        format!("{}/v1/recognitions", self.base_url)
    }

    async fn get_recognition(&self, job_id: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .get(format!("{}/{}", self.recognitions_url(), job_id))
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .await?;
        Ok(check_status(response).await?.text().await?)
    }
}

/// Content type for the upload; raw PCM must carry its rate.
fn content_type(descriptor: &AudioDescriptor) -> String {
    if descriptor.codec_tag == "audio/l16" {
        format!("audio/l16;rate={}", descriptor.sample_rate_hz)
    } else {
        descriptor.codec_tag.clone()
    }
}

fn map_status(status: &str) -> JobStatus {
    match status {
        "waiting" => JobStatus::Submitted,
        "processing" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed {
            reason: "recognition failed".to_string(),
        },
        other => JobStatus::Failed {
            reason: format!("unknown recognition status {}", other),
        },
    }
}

#[async_trait]
impl RemoteTranscriptionBackend for IbmBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ibm
    }

    fn formats(&self) -> &FormatTable {
        &FORMATS
    }

    async fn submit(&self, file: &FileRef, descriptor: &AudioDescriptor) -> Result<String, BackendError> {
        let body = read_local(file).await?;
        let model = format!("{}_BroadbandModel", self.language);
        let response = self
            .client
            .post(self.recognitions_url())
            .query(&[("model", model.as_str())])
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::CONTENT_TYPE, content_type(descriptor))
            .body(body)
            .send()
            .await?;
        let recognition: Recognition = check_status(response).await?.json().await?;
        if recognition.id.is_empty() {
            return Err(BackendError::Protocol("recognition has no id".to_string()));
        }
        Ok(recognition.id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        let text = self.get_recognition(job_id).await?;
        let recognition: Recognition = serde_json::from_str(&text)
            .map_err(|e| BackendError::Protocol(format!("recognition {}: {}", job_id, e)))?;
        Ok(map_status(&recognition.status))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<String, BackendError> {
        self.get_recognition(job_id).await
    }

    fn parse_transcript(&self, payload: &str) -> Result<String, String> {
        let doc: RecognitionResults = serde_json::from_str(payload).map_err(|e| e.to_string())?;
        let first = doc
            .results
            .first()
            .ok_or_else(|| "recognition has no results".to_string())?;
        Ok(first
            .results
            .iter()
            .filter_map(|s| s.alternatives.first())
            .map(|a| a.transcript.as_str())
            .collect::<String>()
            .trim()
            .to_string())
    }
}
