//! One `RemoteTranscriptionBackend` per provider. Only transport lives here;
//! batching and polling belong to the engine in `crate::transcribe`.

pub mod aws;
pub mod azure;
pub mod azure_advanced;
pub mod google;
pub mod ibm;
pub mod sigv4;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::BackendError;
use crate::transcribe::backend::{BackendKind, FileRef, FormatTable};

pub use aws::AwsBackend;
pub use azure::AzureBackend;
pub use azure_advanced::AzureAdvancedBackend;
pub use google::GoogleBackend;
pub use ibm::IbmBackend;

/// Input formats of a backend, without resolving it.
pub fn formats_for(kind: BackendKind) -> &'static FormatTable {
    match kind {
        BackendKind::Aws => &aws::FORMATS,
        BackendKind::Google => &google::FORMATS,
        BackendKind::Ibm => &ibm::FORMATS,
        BackendKind::Azure => &azure::FORMATS,
        BackendKind::AzureAdvanced => &azure_advanced::FORMATS,
    }
}

/// Shared HTTP client settings for every provider.
pub(crate) fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
}

/// Turn a non-2xx response into `BackendError::Status` with its body.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".to_string());
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Read the bytes of a file that is submitted inline.
pub(crate) async fn read_local(file: &FileRef) -> Result<Vec<u8>, BackendError> {
    let path = file
        .local_path()
        .ok_or_else(|| BackendError::Protocol("expected a local file reference".to_string()))?;
    Ok(tokio::fs::read(path).await?)
}

/// Object key for a staged file: unique per upload, restricted to characters
/// every provider accepts unescaped.
pub(crate) fn object_key(path: &Path) -> String {
    let name: String = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", uuid::Uuid::new_v4().simple(), name)
}

/// Names of a backend's scratch containers.
///
/// The registry hands each backend a unique base name. Every run gets
/// `<base>-<n>`, so a run never re-creates a container that an earlier run
/// created or failed to delete.
pub(crate) struct ScratchContainer {
    base: String,
    runs: AtomicU64,
    current: Mutex<Option<String>>,
}

impl ScratchContainer {
    pub(crate) fn new(base: String) -> Self {
        Self {
            base,
            runs: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Pick the container name for a new run.
    pub(crate) fn next_run(&self) -> String {
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{}", self.base, run);
        *self.lock() = Some(name.clone());
        name
    }

    /// Container of the run in progress.
    pub(crate) fn current(&self) -> Result<String, BackendError> {
        self.lock()
            .clone()
            .ok_or_else(|| BackendError::Protocol("no scratch container has been created".to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
