//! Azure Speech short-audio REST recognition.
//!
//! The service answers synchronously. `submit` performs the recognition and
//! parks the response under a generated id, so the usual poll/fetch cycle
//! completes on the first poll.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
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
        FormatSpec {
            extension: "pcm",
            codec_tag: "audio/wav",
            probe: HeaderProbe::Raw { assumed_rate_hz: 16_000 },
        },
    ],
    sample_rates: SampleRateRange::new(8_000, 16_000),
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SimpleResult {
    recognition_status: String,
    #[serde(default)]
    display_text: String,
}

pub struct AzureBackend {
    client: reqwest::Client,
    endpoint: String,
    subscription_key: String,
    language: String,
    parked: Mutex<HashMap<String, String>>,
}

impl AzureBackend {
    pub fn new(client: reqwest::Client, region: &str, subscription_key: String, language: String) -> Self {
        Self {
            client,
            endpoint: format!(
                "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
                region
            ),
            subscription_key,
            language,
            parked: Mutex::new(HashMap::new()),
        }
    }

    fn parked(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.parked.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn park(&self, payload: String) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        self.parked().insert(job_id.clone(), payload);
        job_id
    }
}

#[async_trait]
impl RemoteTranscriptionBackend for AzureBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Azure
    }

    fn formats(&self) -> &FormatTable {
        &FORMATS
    }

    async fn submit(&self, file: &FileRef, descriptor: &AudioDescriptor) -> Result<String, BackendError> {
        let body = read_local(file).await?;
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("language", self.language.as_str()), ("format", "simple")])
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!(
                    "{}; codecs=audio/pcm; samplerate={}",
                    descriptor.codec_tag, descriptor.sample_rate_hz
                ),
            )
            .body(body)
            .send()
            .await?;
        let payload = check_status(response).await?.text().await?;
        Ok(self.park(payload))
    }

    /// Drops a result that was never fetched, e.g. after a cancel or timeout.
    async fn delete_file(&self, _file: &FileRef, job_id: Option<&str>) -> Result<(), BackendError> {
        if let Some(job_id) = job_id {
            if self.parked().remove(job_id).is_some() {
                tracing::debug!(job_id = %job_id, "Discarded unfetched result");
            }
        }
        Ok(())
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        if self.parked().contains_key(job_id) {
            Ok(JobStatus::Completed)
        } else {
            Err(BackendError::Protocol(format!("unknown job {}", job_id)))
        }
    }

    async fn fetch_result(&self, job_id: &str) -> Result<String, BackendError> {
        self.parked()
            .remove(job_id)
            .ok_or_else(|| BackendError::Protocol(format!("no result parked for job {}", job_id)))
    }

    fn parse_transcript(&self, payload: &str) -> Result<String, String> {
        let result: SimpleResult = serde_json::from_str(payload).map_err(|e| e.to_string())?;
        match result.recognition_status.as_str() {
            "Success" => Ok(result.display_text),
            "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => Ok(String::new()),
            other => Err(format!("recognition status {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> AzureBackend {
        AzureBackend::new(
            reqwest::Client::new(),
            "westus",
            "key".to_string(),
            "en-US".to_string(),
        )
    }

    #[tokio::test]
    async fn test_parked_result_completes_once() {
        let b = backend();
        let job_id = b.park(r#"{"RecognitionStatus":"Success","DisplayText":"Hi."}"#.to_string());

        assert_eq!(b.poll(&job_id).await.unwrap(), JobStatus::Completed);
        let payload = b.fetch_result(&job_id).await.unwrap();
        assert_eq!(b.parse_transcript(&payload).unwrap(), "Hi.");

        assert!(b.poll(&job_id).await.is_err());
        assert!(b.fetch_result(&job_id).await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_discards_unfetched_result() {
        let b = backend();
        let abandoned = b.park(r#"{"RecognitionStatus":"Success","DisplayText":"Gone."}"#.to_string());
        let kept = b.park(r#"{"RecognitionStatus":"Success","DisplayText":"Kept."}"#.to_string());
        let file = FileRef::Local("call.wav".into());

        b.delete_file(&file, Some(&abandoned)).await.unwrap();
        b.delete_file(&file, None).await.unwrap();

        assert!(b.poll(&abandoned).await.is_err());
        assert_eq!(b.parked().len(), 1);
        assert_eq!(b.poll(&kept).await.unwrap(), JobStatus::Completed);
    }

    #[test]
    fn test_parse_transcript_statuses() {
        let b = backend();
        assert_eq!(
            b.parse_transcript(r#"{"RecognitionStatus":"NoMatch"}"#).unwrap(),
            ""
        );
        assert!(b
            .parse_transcript(r#"{"RecognitionStatus":"Error"}"#)
            .is_err());
    }

    #[test]
    fn test_narrow_sample_rate_range() {
        let formats = backend().formats().sample_rates;
        assert!(formats.accepts(16_000));
        assert!(!formats.accepts(22_050));
        assert!(backend().formats().lookup("mp3").is_none());
    }

    #[test]
    fn test_endpoint_uses_region() {
        assert!(backend()
            .endpoint
            .starts_with("https://westus.stt.speech.microsoft.com/"));
    }
}
