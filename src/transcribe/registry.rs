use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::backends::sigv4::SigV4;
use crate::backends::{
    http_client, AwsBackend, AzureAdvancedBackend, AzureBackend, GoogleBackend, IbmBackend,
};
use crate::config::{secret_or_env, BackendsConfig, Config};
use crate::error::RegistryError;
use crate::transcribe::backend::{BackendKind, RemoteTranscriptionBackend};

/// Produces a ready backend for a kind.
///
/// The facade only talks to this trait, so tests can hand it fakes.
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, kind: BackendKind) -> Result<Arc<dyn RemoteTranscriptionBackend>, RegistryError>;
}

/// Builds the real provider backends from the `[backends.*]` config sections.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: BackendsConfig,
    language: String,
}

/// Serializes writes to process-wide environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Base name for a backend's scratch buckets, unique per resolution.
pub fn scratch_container_name() -> String {
    format!("batchscribe-{}", uuid::Uuid::new_v4())
}

const GOOGLE_CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Export GOOGLE_APPLICATION_CREDENTIALS once; an existing value wins.
fn export_google_credentials(path: &Path) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if std::env::var_os(GOOGLE_CREDENTIALS_VAR).is_none() {
        std::env::set_var(GOOGLE_CREDENTIALS_VAR, path);
        tracing::debug!("Exported {}={}", GOOGLE_CREDENTIALS_VAR, path.display());
    }
}

fn missing_section(kind: BackendKind, section: &str) -> RegistryError {
    RegistryError::CredentialResolution {
        kind,
        reason: format!("no [backends.{}] section in the config", section),
    }
}

fn require(kind: BackendKind, field: &str, value: &str) -> Result<String, RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::CredentialResolution {
            kind,
            reason: format!("{} is empty", field),
        });
    }
    Ok(value.trim().to_string())
}

fn require_secret(kind: BackendKind, field: &str, value: &str, var: &str) -> Result<String, RegistryError> {
    secret_or_env(value, var).ok_or_else(|| RegistryError::CredentialResolution {
        kind,
        reason: format!("{} is empty and {} is not set", field, var),
    })
}

/// Region/location identifiers end up in host names.
fn validate_region(kind: BackendKind, region: &str) -> Result<(), RegistryError> {
    let valid = !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::BackendInitialization {
            kind,
            reason: format!("invalid region {:?}", region),
        })
    }
}

fn client(kind: BackendKind) -> Result<reqwest::Client, RegistryError> {
    http_client().map_err(|e| RegistryError::BackendInitialization {
        kind,
        reason: format!("HTTP client: {}", e),
    })
}

impl BackendRegistry {
    pub fn new(backends: BackendsConfig, language: impl Into<String>) -> Self {
        Self {
            backends,
            language: language.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backends.clone(), config.transcription.language.clone())
    }

    fn aws(&self) -> Result<AwsBackend, RegistryError> {
        let kind = BackendKind::Aws;
        let cfg = self.backends.aws.as_ref().ok_or_else(|| missing_section(kind, "aws"))?;
        let access_key = require(kind, "access_key", &cfg.access_key)?;
        let secret = require_secret(
            kind,
            "secret_access_key",
            &cfg.secret_access_key,
            "BATCHSCRIBE_AWS_SECRET_ACCESS_KEY",
        )?;
        let region = require(kind, "region", &cfg.region)?;
        validate_region(kind, &region)?;

        Ok(AwsBackend::new(
            client(kind)?,
            SigV4::new(&access_key, &secret, &region),
            scratch_container_name(),
            self.language.clone(),
        ))
    }

    fn google(&self) -> Result<GoogleBackend, RegistryError> {
        let kind = BackendKind::Google;
        let cfg = self
            .backends
            .google
            .as_ref()
            .ok_or_else(|| missing_section(kind, "google"))?;
        let project_id = require(kind, "project_id", &cfg.project_id)?;
        let token = require_secret(
            kind,
            "access_token",
            &cfg.access_token,
            "BATCHSCRIBE_GOOGLE_ACCESS_TOKEN",
        )?;

        if !cfg.credentials_path.as_os_str().is_empty() {
            if !cfg.credentials_path.is_file() {
                return Err(RegistryError::CredentialResolution {
                    kind,
                    reason: format!(
                        "credentials file {} does not exist",
                        cfg.credentials_path.display()
                    ),
                });
            }
            export_google_credentials(&cfg.credentials_path);
        }

        Ok(GoogleBackend::new(
            client(kind)?,
            token,
            project_id,
            scratch_container_name(),
            cfg.bucket_location.clone(),
            self.language.clone(),
        ))
    }

    fn ibm(&self) -> Result<IbmBackend, RegistryError> {
        let kind = BackendKind::Ibm;
        let cfg = self.backends.ibm.as_ref().ok_or_else(|| missing_section(kind, "ibm"))?;
        let username = require(kind, "username", &cfg.username)?;
        let password = require_secret(kind, "password", &cfg.password, "BATCHSCRIBE_IBM_PASSWORD")?;
        let base = url::Url::parse(&cfg.url).map_err(|e| RegistryError::BackendInitialization {
            kind,
            reason: format!("invalid url {:?}: {}", cfg.url, e),
        })?;

        Ok(IbmBackend::new(
            client(kind)?,
            base.as_str(),
            &username,
            &password,
            self.language.clone(),
        ))
    }

    fn azure(&self) -> Result<AzureBackend, RegistryError> {
        let kind = BackendKind::Azure;
        let cfg = self
            .backends
            .azure
            .as_ref()
            .ok_or_else(|| missing_section(kind, "azure"))?;
        let key = require_secret(
            kind,
            "subscription_key",
            &cfg.subscription_key,
            "BATCHSCRIBE_AZURE_KEY",
        )?;
        let region = require(kind, "region", &cfg.region)?;
        validate_region(kind, &region)?;

        Ok(AzureBackend::new(client(kind)?, &region, key, self.language.clone()))
    }

    fn azure_advanced(&self) -> Result<AzureAdvancedBackend, RegistryError> {
        let kind = BackendKind::AzureAdvanced;
        let cfg = self
            .backends
            .azure_advanced
            .as_ref()
            .ok_or_else(|| missing_section(kind, "azure_advanced"))?;
        let key = require_secret(
            kind,
            "subscription_key",
            &cfg.subscription_key,
            "BATCHSCRIBE_AZURE_ADVANCED_KEY",
        )?;
        let account_id = require(kind, "account_id", &cfg.account_id)?;
        let location = require(kind, "location", &cfg.location)?;
        validate_region(kind, &location)?;

        Ok(AzureAdvancedBackend::new(
            client(kind)?,
            key,
            account_id,
            location,
            self.language.clone(),
        ))
    }
}

impl BackendResolver for BackendRegistry {
    fn resolve(&self, kind: BackendKind) -> Result<Arc<dyn RemoteTranscriptionBackend>, RegistryError> {
        let backend: Arc<dyn RemoteTranscriptionBackend> = match kind {
            BackendKind::Aws => Arc::new(self.aws()?),
            BackendKind::Google => Arc::new(self.google()?),
            BackendKind::Ibm => Arc::new(self.ibm()?),
            BackendKind::Azure => Arc::new(self.azure()?),
            BackendKind::AzureAdvanced => Arc::new(self.azure_advanced()?),
        };
        tracing::info!("Resolved {} backend", kind);
        Ok(backend)
    }
}
