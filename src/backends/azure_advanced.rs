//! Azure Video Indexer. Handles video containers and long media; the
//! transcript comes back as WebVTT captions.

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, read_local};
use crate::error::BackendError;
use crate::transcribe::backend::{
    BackendKind, FileRef, FormatSpec, FormatTable, HeaderProbe, JobStatus, RemoteTranscriptionBackend,
    SampleRateRange,
};
use crate::transcribe::descriptor::AudioDescriptor;

const API: &str = "https://api.videoindexer.ai";

pub(crate) const FORMATS: FormatTable = FormatTable {
    formats: &[
        FormatSpec { extension: "wav", codec_tag: "wav", probe: HeaderProbe::Wav },
        FormatSpec { extension: "mp3", codec_tag: "mp3", probe: HeaderProbe::Container },
        FormatSpec { extension: "flac", codec_tag: "flac", probe: HeaderProbe::Container },
        FormatSpec { extension: "mp4", codec_tag: "mp4", probe: HeaderProbe::Container },
        FormatSpec { extension: "m4a", codec_tag: "m4a", probe: HeaderProbe::Container },
        FormatSpec { extension: "m4v", codec_tag: "m4v", probe: HeaderProbe::Container },
        FormatSpec { extension: "mov", codec_tag: "mov", probe: HeaderProbe::Container },
        FormatSpec { extension: "mkv", codec_tag: "mkv", probe: HeaderProbe::Container },
    ],
    sample_rates: SampleRateRange::new(8_000, 48_000),
};

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct VideoIndex {
    #[serde(default)]
    state: String,
    #[serde(default, rename = "failureMessage")]
    failure_message: Option<String>,
}

pub struct AzureAdvancedBackend {
    client: reqwest::Client,
    subscription_key: String,
    account_id: String,
    location: String,
    language: String,
}

impl AzureAdvancedBackend {
    pub fn new(
        client: reqwest::Client,
        subscription_key: String,
        account_id: String,
        location: String,
        language: String,
    ) -> Self {
        Self {
            client,
            subscription_key,
            account_id,
            location,
            language,
        }
    }

    fn account_url(&self) -> String {
        format!("{}/{}/Accounts/{}", API, self.location, self.account_id)
    }

    /// Short-lived account token; fetched per call since jobs can outlive it.
    async fn access_token(&self) -> Result<String, BackendError> {
        let response = self
            .client
            .get(format!(
                "{}/auth/{}/Accounts/{}/AccessToken",
                API, self.location, self.account_id
            ))
            .query(&[("allowEdit", "true")])
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .send()
            .await?;
        let token: String = check_status(response).await?.json().await?;
        Ok(token)
    }
}

fn map_state(index: &VideoIndex) -> JobStatus {
    match index.state.as_str() {
        "Uploaded" => JobStatus::Submitted,
        "Processing" => JobStatus::Running,
        "Processed" => JobStatus::Completed,
        other => JobStatus::Failed {
            reason: index
                .failure_message
                .clone()
                .unwrap_or_else(|| format!("indexing ended in state {}", other)),
        },
    }
}

/// Caption text of a WebVTT document: every line that follows a cue timing
/// line, up to the blank line ending the cue.
fn captions_text(vtt: &str) -> String {
    let mut lines = Vec::new();
    let mut in_cue = false;
    for line in vtt.lines() {
        let line = line.trim();
        if line.contains("-->") {
            in_cue = true;
        } else if line.is_empty() {
            in_cue = false;
        } else if in_cue {
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[async_trait]
impl RemoteTranscriptionBackend for AzureAdvancedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::AzureAdvanced
    }

    fn formats(&self) -> &FormatTable {
        &FORMATS
    }

    async fn submit(&self, file: &FileRef, _descriptor: &AudioDescriptor) -> Result<String, BackendError> {
        let path = file
            .local_path()
            .ok_or_else(|| BackendError::Protocol("expected a local file reference".to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let body = read_local(file).await?;

        let token = self.access_token().await?;
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(body).file_name(name.clone()));
        let response = self
            .client
            .post(format!("{}/Videos", self.account_url()))
            .query(&[
                ("accessToken", token.as_str()),
                ("name", name.as_str()),
                ("privacy", "Private"),
                ("language", self.language.as_str()),
            ])
            .multipart(form)
            .send()
            .await?;
        let video: UploadedVideo = check_status(response).await?.json().await?;
        if video.id.is_empty() {
            return Err(BackendError::Protocol("upload returned no video id".to_string()));
        }
        Ok(video.id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/Videos/{}/Index", self.account_url(), job_id))
            .query(&[("accessToken", token.as_str())])
            .send()
            .await?;
        let index: VideoIndex = check_status(response).await?.json().await?;
        Ok(map_state(&index))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<String, BackendError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/Videos/{}/Captions", self.account_url(), job_id))
            .query(&[
                ("accessToken", token.as_str()),
                ("format", "Vtt"),
                ("language", self.language.as_str()),
            ])
            .send()
            .await?;
        Ok(check_status(response).await?.text().await?)
    }

    /// The uploaded video is the remote copy; it is keyed by job id.
    async fn delete_file(&self, _file: &FileRef, job_id: Option<&str>) -> Result<(), BackendError> {
        let Some(job_id) = job_id else {
            return Ok(());
        };
        let token = self.access_token().await?;
        let response = self
            .client
            .delete(format!("{}/Videos/{}", self.account_url(), job_id))
            .query(&[("accessToken", token.as_str())])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    fn parse_transcript(&self, payload: &str) -> Result<String, String> {
        if !payload.trim_start().starts_with("WEBVTT") {
            return Err("captions are not a WebVTT document".to_string());
        }
        Ok(captions_text(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> AzureAdvancedBackend {
        AzureAdvancedBackend::new(
            reqwest::Client::new(),
            "key".to_string(),
            "acc-1".to_string(),
            "trial".to_string(),
            "en-US".to_string(),
        )
    }

    #[test]
    fn test_parse_vtt_keeps_cue_text() {
        let vtt = "WEBVTT\n\n\
                   1\n00:00:00.000 --> 00:00:02.500\nGood morning.\n\n\
                   2\n00:00:02.500 --> 00:00:05.000\nLet's begin\nthe meeting.\n";
        assert_eq!(
            backend().parse_transcript(vtt).unwrap(),
            "Good morning.\nLet's begin\nthe meeting."
        );
        assert!(backend().parse_transcript("<html>").is_err());
    }

    #[test]
    fn test_state_mapping() {
        let index = |state: &str| VideoIndex {
            state: state.to_string(),
            failure_message: None,
        };
        assert_eq!(map_state(&index("Uploaded")), JobStatus::Submitted);
        assert_eq!(map_state(&index("Processing")), JobStatus::Running);
        assert_eq!(map_state(&index("Processed")), JobStatus::Completed);
        assert!(matches!(map_state(&index("Failed")), JobStatus::Failed { .. }));
    }

    #[test]
    fn test_accepts_video_containers() {
        let b = backend();
        for ext in ["mp4", "mov", "m4v", "mkv"] {
            assert!(b.formats().lookup(ext).is_some(), "{}", ext);
        }
        assert_eq!(b.account_url(), "https://api.videoindexer.ai/trial/Accounts/acc-1");
    }
}
