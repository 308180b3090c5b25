//! Amazon Transcribe with an S3 scratch bucket.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::sigv4::{sha256_hex, SigV4};
use super::{check_status, object_key, ScratchContainer};
use crate::error::BackendError;
use crate::transcribe::backend::{
    BackendKind, FileRef, FormatSpec, FormatTable, HeaderProbe, JobStatus, RemoteTranscriptionBackend,
    SampleRateRange,
};
use crate::transcribe::descriptor::AudioDescriptor;

pub(crate) const FORMATS: FormatTable = FormatTable {
    formats: &[
        FormatSpec { extension: "wav", codec_tag: "wav", probe: HeaderProbe::Wav },
        FormatSpec { extension: "mp3", codec_tag: "mp3", probe: HeaderProbe::Container },
        FormatSpec { extension: "flac", codec_tag: "flac", probe: HeaderProbe::Container },
        FormatSpec { extension: "m4a", codec_tag: "mp4", probe: HeaderProbe::Container },
    ],
    sample_rates: SampleRateRange::new(8_000, 48_000),
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobEnvelope {
    transcription_job: TranscriptionJob,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranscriptionJob {
    transcription_job_status: String,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    transcript: Option<TranscriptLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranscriptLocation {
    transcript_file_uri: String,
}

#[derive(Debug, Deserialize)]
struct ResultDocument {
    results: ResultBody,
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    transcripts: Vec<ResultTranscript>,
}

#[derive(Debug, Deserialize)]
struct ResultTranscript {
    transcript: String,
}

pub struct AwsBackend {
    client: reqwest::Client,
    signer: SigV4,
    buckets: ScratchContainer,
    language: String,
}

impl AwsBackend {
    /// `bucket_base` prefixes every per-run scratch bucket name.
    pub fn new(client: reqwest::Client, signer: SigV4, bucket_base: String, language: String) -> Self {
        Self {
            client,
            signer,
            buckets: ScratchContainer::new(bucket_base),
            language,
        }
    }

    fn s3_url(&self, bucket: &str, key: Option<&str>) -> Result<Url, BackendError> {
        let raw = match key {
            Some(key) => format!(
                "https://s3.{}.amazonaws.com/{}/{}",
                self.signer.region(),
                bucket,
                key
            ),
            None => format!("https://s3.{}.amazonaws.com/{}", self.signer.region(), bucket),
        };
        Url::parse(&raw).map_err(|e| BackendError::Protocol(format!("bad S3 URL {}: {}", raw, e)))
    }

    fn transcribe_url(&self) -> Result<Url, BackendError> {
        let raw = format!("https://transcribe.{}.amazonaws.com/", self.signer.region());
        Url::parse(&raw).map_err(|e| BackendError::Protocol(format!("bad endpoint {}: {}", raw, e)))
    }

    /// Send a signed request and return the successful response.
    async fn send(
        &self,
        service: &str,
        method: reqwest::Method,
        url: Url,
        mut headers: Vec<(&str, String)>,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, BackendError> {
        let payload_hash = sha256_hex(&body);
        headers.push(("x-amz-content-sha256", payload_hash.clone()));
        let auth = self.signer.sign(
            service,
            method.as_str(),
            &url,
            &headers,
            &payload_hash,
            chrono::Utc::now(),
        )?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers.iter() {
            request = request.header(*name, value.as_str());
        }
        for (name, value) in auth {
            request = request.header(name, value);
        }
        let response = request.body(body).send().await?;
        check_status(response).await
    }

    async fn transcribe_call(&self, target: &str, body: serde_json::Value) -> Result<String, BackendError> {
        let body = serde_json::to_vec(&body).map_err(|e| BackendError::Protocol(e.to_string()))?;
        let response = self
            .send(
                "transcribe",
                reqwest::Method::POST,
                self.transcribe_url()?,
                vec![
                    ("content-type", "application/x-amz-json-1.1".to_string()),
                    ("x-amz-target", format!("Transcribe.{}", target)),
                ],
                body,
            )
            .await?;
        Ok(response.text().await?)
    }

    async fn get_job(&self, job_id: &str) -> Result<TranscriptionJob, BackendError> {
        let text = self
            .transcribe_call("GetTranscriptionJob", json!({ "TranscriptionJobName": job_id }))
            .await?;
        let envelope: JobEnvelope = serde_json::from_str(&text)
            .map_err(|e| BackendError::Protocol(format!("GetTranscriptionJob: {}", e)))?;
        Ok(envelope.transcription_job)
    }
}

/// Body of the bucket-creation request. us-east-1 rejects an explicit
/// location constraint.
fn create_bucket_body(region: &str) -> Vec<u8> {
    if region == "us-east-1" {
        return Vec::new();
    }
    format!(
        "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
        region
    )
    .into_bytes()
}

fn map_status(job: &TranscriptionJob) -> JobStatus {
    match job.transcription_job_status.as_str() {
        "QUEUED" => JobStatus::Submitted,
        "IN_PROGRESS" => JobStatus::Running,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" => JobStatus::Failed {
            reason: job
                .failure_reason
                .clone()
                .unwrap_or_else(|| "no failure reason given".to_string()),
        },
        other => JobStatus::Failed {
            reason: format!("unknown job status {}", other),
        },
    }
}

#[async_trait]
impl RemoteTranscriptionBackend for AwsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Aws
    }

    fn formats(&self) -> &FormatTable {
        &FORMATS
    }

    fn uses_container(&self) -> bool {
        true
    }

    async fn create_container(&self) -> Result<(), BackendError> {
        let bucket = self.buckets.next_run();
        self.send(
            "s3",
            reqwest::Method::PUT,
            self.s3_url(&bucket, None)?,
            Vec::new(),
            create_bucket_body(self.signer.region()),
        )
        .await?;
        tracing::debug!(bucket = %bucket, "S3 bucket created");
        Ok(())
    }

    async fn delete_container(&self) -> Result<(), BackendError> {
        let bucket = self.buckets.current()?;
        self.send("s3", reqwest::Method::DELETE, self.s3_url(&bucket, None)?, Vec::new(), Vec::new())
            .await?;
        Ok(())
    }

    async fn upload_file(&self, path: &Path) -> Result<FileRef, BackendError> {
        let bucket = self.buckets.current()?;
        let key = object_key(path);
        let body = tokio::fs::read(path).await?;
        self.send("s3", reqwest::Method::PUT, self.s3_url(&bucket, Some(&key))?, Vec::new(), body)
            .await?;
        let uri = format!("s3://{}/{}", bucket, key);
        Ok(FileRef::Remote { key, uri })
    }

    async fn delete_file(&self, file: &FileRef, _job_id: Option<&str>) -> Result<(), BackendError> {
        if let FileRef::Remote { key, .. } = file {
            let bucket = self.buckets.current()?;
            self.send(
                "s3",
                reqwest::Method::DELETE,
                self.s3_url(&bucket, Some(key))?,
                Vec::new(),
                Vec::new(),
            )
            .await?;
        }
        Ok(())
    }

    async fn submit(&self, file: &FileRef, descriptor: &AudioDescriptor) -> Result<String, BackendError> {
        let FileRef::Remote { uri, .. } = file else {
            return Err(BackendError::Protocol(
                "Amazon Transcribe needs the file staged in S3".to_string(),
            ));
        };
        let job_name = format!("batchscribe-{}", uuid::Uuid::new_v4().simple());
        self.transcribe_call(
            "StartTranscriptionJob",
            json!({
                "TranscriptionJobName": job_name,
                "LanguageCode": self.language,
                "MediaFormat": descriptor.codec_tag,
                "MediaSampleRateHertz": descriptor.sample_rate_hz,
                "Media": { "MediaFileUri": uri },
            }),
        )
        .await?;
        Ok(job_name)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        Ok(map_status(&self.get_job(job_id).await?))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<String, BackendError> {
        let job = self.get_job(job_id).await?;
        let location = job.transcript.ok_or_else(|| {
            BackendError::Protocol(format!("job {} has no transcript location", job_id))
        })?;
        // Pre-signed URL; no request signing.
        let response = self.client.get(&location.transcript_file_uri).send().await?;
        Ok(check_status(response).await?.text().await?)
    }

    fn parse_transcript(&self, payload: &str) -> Result<String, String> {
        let doc: ResultDocument = serde_json::from_str(payload).map_err(|e| e.to_string())?;
        Ok(doc
            .results
            .transcripts
            .into_iter()
            .map(|t| t.transcript)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
