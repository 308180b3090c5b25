//! Google Cloud Speech-to-Text long-running recognition, staged through a
//! Cloud Storage bucket.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{check_status, object_key, ScratchContainer};
use crate::error::BackendError;
use crate::transcribe::backend::{
    BackendKind, FileRef, FormatSpec, FormatTable, HeaderProbe, JobStatus, RemoteTranscriptionBackend,
    SampleRateRange,
};
use crate::transcribe::descriptor::AudioDescriptor;

const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1";
const SPEECH_API: &str = "https://speech.googleapis.com/v1";

pub(crate) const FORMATS: FormatTable = FormatTable {
    formats: &[
        FormatSpec { extension: "wav", codec_tag: "LINEAR16", probe: HeaderProbe::Wav },
        FormatSpec { extension: "flac", codec_tag: "FLAC", probe: HeaderProbe::Container },
        FormatSpec { extension: "ogg", codec_tag: "OGG_OPUS", probe: HeaderProbe::Container },
    ],
    sample_rates: SampleRateRange::new(8_000, 48_000),
};

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OperationResult {
    response: RecognizeResponse,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

pub struct GoogleBackend {
    client: reqwest::Client,
    access_token: String,
    project_id: String,
    buckets: ScratchContainer,
    bucket_location: String,
    language: String,
}

impl GoogleBackend {
    pub fn new(
        client: reqwest::Client,
        access_token: String,
        project_id: String,
        bucket_base: String,
        bucket_location: String,
        language: String,
    ) -> Self {
        Self {
            client,
            access_token,
            project_id,
            buckets: ScratchContainer::new(bucket_base),
            bucket_location,
            language,
        }
    }

    async fn get_operation(&self, job_id: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .get(format!("{}/operations/{}", SPEECH_API, job_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_status(response).await?.text().await?)
    }
}

fn map_operation(op: &Operation) -> JobStatus {
    match (&op.error, op.done) {
        (Some(error), _) => JobStatus::Failed {
            reason: error.message.clone(),
        },
        (None, true) => JobStatus::Completed,
        (None, false) if op.metadata.is_some() => JobStatus::Running,
        (None, false) => JobStatus::Submitted,
    }
}

#[async_trait]
impl RemoteTranscriptionBackend for GoogleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn formats(&self) -> &FormatTable {
        &FORMATS
    }

    fn uses_container(&self) -> bool {
        true
    }

    async fn create_container(&self) -> Result<(), BackendError> {
        let bucket = self.buckets.next_run();
        let response = self
            .client
            .post(format!("{}/b", STORAGE_API))
            .query(&[("project", self.project_id.as_str())])
            .bearer_auth(&self.access_token)
            .json(&json!({ "name": bucket, "location": self.bucket_location }))
            .send()
            .await?;
        check_status(response).await?;
        tracing::debug!(bucket = %bucket, "Storage bucket created");
        Ok(())
    }

    async fn delete_container(&self) -> Result<(), BackendError> {
        let bucket = self.buckets.current()?;
        let response = self
            .client
            .delete(format!("{}/b/{}", STORAGE_API, bucket))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn upload_file(&self, path: &Path) -> Result<FileRef, BackendError> {
        let bucket = self.buckets.current()?;
        let key = object_key(path);
        let body = tokio::fs::read(path).await?;
        let response = self
            .client
            .post(format!("{}/b/{}/o", UPLOAD_API, bucket))
            .query(&[("uploadType", "media"), ("name", key.as_str())])
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        check_status(response).await?;
        let uri = format!("gs://{}/{}", bucket, key);
        Ok(FileRef::Remote { key, uri })
    }

    async fn delete_file(&self, file: &FileRef, _job_id: Option<&str>) -> Result<(), BackendError> {
        if let FileRef::Remote { key, .. } = file {
            let bucket = self.buckets.current()?;
            let response = self
                .client
                .delete(format!("{}/b/{}/o/{}", STORAGE_API, bucket, key))
                .bearer_auth(&self.access_token)
                .send()
                .await?;
            check_status(response).await?;
        }
        Ok(())
    }

    async fn submit(&self, file: &FileRef, descriptor: &AudioDescriptor) -> Result<String, BackendError> {
        let FileRef::Remote { uri, .. } = file else {
            return Err(BackendError::Protocol(
                "Speech-to-Text needs the file staged in Cloud Storage".to_string(),
            ));
        };
        let response = self
            .client
            .post(format!("{}/speech:longrunningrecognize", SPEECH_API))
            .bearer_auth(&self.access_token)
            .json(&json!({
                "config": {
                    "encoding": descriptor.codec_tag,
                    "sampleRateHertz": descriptor.sample_rate_hz,
                    "languageCode": self.language,
                },
                "audio": { "uri": uri },
            }))
            .send()
            .await?;
        let op: Operation = check_status(response).await?.json().await?;
        if op.name.is_empty() {
            return Err(BackendError::Protocol("operation has no name".to_string()));
        }
        Ok(op.name)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        let text = self.get_operation(job_id).await?;
        let op: Operation = serde_json::from_str(&text)
            .map_err(|e| BackendError::Protocol(format!("operation {}: {}", job_id, e)))?;
        Ok(map_operation(&op))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<String, BackendError> {
        self.get_operation(job_id).await
    }

    fn parse_transcript(&self, payload: &str) -> Result<String, String> {
        let result: OperationResult = serde_json::from_str(payload).map_err(|e| e.to_string())?;
        Ok(result
            .response
            .results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
