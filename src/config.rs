use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transcribe::backend::BackendKind;
use crate::transcribe::lifecycle::LifecycleConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcription: TranscriptionConfig,
    pub output: OutputConfig,
    pub dispatch: DispatchConfig,
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub backend: BackendKind,
    /// BCP-47 language code sent to every backend.
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub chunk_size: usize,
    pub poll_interval_secs: u64,
    /// 0 disables the per-job timeout.
    pub job_timeout_secs: u64,
    pub max_consecutive_poll_errors: u32,
}

/// One optional credential section per backend. A missing section means the
/// backend cannot be resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub aws: Option<AwsConfig>,
    pub google: Option<GoogleConfig>,
    pub ibm: Option<IbmConfig>,
    pub azure: Option<AzureConfig>,
    pub azure_advanced: Option<AzureAdvancedConfig>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub access_key: String,
    /// Or set BATCHSCRIBE_AWS_SECRET_ACCESS_KEY.
    pub secret_access_key: String,
    pub region: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Service account file exported as GOOGLE_APPLICATION_CREDENTIALS.
    pub credentials_path: PathBuf,
    pub project_id: String,
    /// OAuth bearer token. Or set BATCHSCRIBE_GOOGLE_ACCESS_TOKEN.
    pub access_token: String,
    /// Location of the scratch bucket.
    pub bucket_location: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IbmConfig {
    pub url: String,
    pub username: String,
    /// Or set BATCHSCRIBE_IBM_PASSWORD.
    pub password: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Or set BATCHSCRIBE_AZURE_KEY.
    pub subscription_key: String,
    pub region: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureAdvancedConfig {
    /// Or set BATCHSCRIBE_AZURE_ADVANCED_KEY.
    pub subscription_key: String,
    pub account_id: String,
    pub location: String,
}

macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* } secret $secret:ident) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .field(stringify!($secret), &"[REDACTED]")
                    .finish()
            }
        }
    };
}

redacted_debug!(AwsConfig { access_key, region } secret secret_access_key);
redacted_debug!(GoogleConfig { credentials_path, project_id, bucket_location } secret access_token);
redacted_debug!(IbmConfig { url, username } secret password);
redacted_debug!(AzureConfig { region } secret subscription_key);
redacted_debug!(AzureAdvancedConfig { account_id, location } secret subscription_key);

/// Use `value` unless it is blank, then fall back to the environment.
pub fn secret_or_env(value: &str, var: &str) -> Option<String> {
    if !value.trim().is_empty() {
        return Some(value.to_string());
    }
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

// --- Default implementations ---

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Aws,
            language: "en-US".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let directory = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("Transcriptions");
        Self { directory }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            poll_interval_secs: 5,
            job_timeout_secs: 0,
            max_consecutive_poll_errors: 3,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::new(),
            project_id: String::new(),
            access_token: String::new(),
            bucket_location: "US".to_string(),
        }
    }
}

impl Default for IbmConfig {
    fn default() -> Self {
        Self {
            url: "https://stream.watsonplatform.net/speech-to-text/api".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl DispatchConfig {
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            job_timeout: (self.job_timeout_secs > 0)
                .then(|| Duration::from_secs(self.job_timeout_secs)),
            max_consecutive_poll_errors: self.max_consecutive_poll_errors,
        }
    }
}

impl BackendsConfig {
    pub fn is_configured(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Aws => self.aws.is_some(),
            BackendKind::Google => self.google.is_some(),
            BackendKind::Ibm => self.ibm.is_some(),
            BackendKind::Azure => self.azure.is_some(),
            BackendKind::AzureAdvanced => self.azure_advanced.is_some(),
        }
    }
}

// --- Config loading ---

impl Config {
    /// Load config and return the resolved file path (if any).
    pub fn load_with_path(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        // 1. Check explicit path
        if let Some(p) = path {
            let content = std::fs::read_to_string(p).map_err(|e| {
                anyhow::anyhow!("Failed to read config file {}: {}", p.display(), e)
            })?;
            let config: Config = toml::from_str(&content)?;
            return Ok((config, Some(p.to_path_buf())));
        }

        // 2. Check beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            let beside_exe = exe_path.parent().map(|p| p.join("batchscribe.toml"));
            if let Some(p) = beside_exe {
                if p.exists() {
                    let content = std::fs::read_to_string(&p)?;
                    let config: Config = toml::from_str(&content)?;
                    return Ok((config, Some(p)));
                }
            }
        }

        // 3. Check platform config directory (e.g. ~/.config/batchscribe/config.toml)
        if let Some(p) = Self::platform_path() {
            if p.exists() {
                let content = std::fs::read_to_string(&p)?;
                let config: Config = toml::from_str(&content)?;
                return Ok((config, Some(p)));
            }
        }

        // 4. Fall back to defaults
        tracing::info!("No config file found, using defaults");
        Ok((Config::default(), None))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_path(path).map(|(config, _)| config)
    }

    pub fn platform_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("batchscribe").join("config.toml"))
    }

    /// Generate a default config file with all fields and inline documentation.
    pub fn generate_default_commented() -> String {
        r#"# batchscribe configuration

[transcription]
# Backend used when --backend is not given: aws, google, ibm, azure, azureadv.
backend = "aws"
# Language code passed to every backend.
language = "en-US"

[output]
# Directory transcripts are written to, as <backend>_<file name>.txt.
# Defaults to ./Transcriptions when omitted.
# directory = "/home/me/transcripts"

[dispatch]
# Files processed concurrently. The next group starts only after every file
# of the current group has finished.
chunk_size = 10
# Seconds between job status checks.
poll_interval_secs = 5
# Give up on a job after this many seconds. 0 waits indefinitely.
job_timeout_secs = 0
# Status-check failures tolerated in a row before a file is marked failed.
max_consecutive_poll_errors = 3

# Credentials. Only the backends you use need a section.

# [backends.aws]
# access_key = ""
# secret_access_key = ""   # or BATCHSCRIBE_AWS_SECRET_ACCESS_KEY
# region = "us-east-1"

# [backends.google]
# credentials_path = "/path/to/service-account.json"
# project_id = ""
# access_token = ""        # or BATCHSCRIBE_GOOGLE_ACCESS_TOKEN
# bucket_location = "US"

# [backends.ibm]
# url = "https://stream.watsonplatform.net/speech-to-text/api"
# username = ""
# password = ""            # or BATCHSCRIBE_IBM_PASSWORD

# [backends.azure]
# subscription_key = ""    # or BATCHSCRIBE_AZURE_KEY
# region = "westus"

# [backends.azure_advanced]
# subscription_key = ""    # or BATCHSCRIBE_AZURE_ADVANCED_KEY
# account_id = ""
# location = "trial"
"#
        .to_string()
    }
}
