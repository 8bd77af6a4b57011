//! Configuration loading and types for blobcopy.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Storage contexts name an account plus the
//! credential used to reach it; the remaining sections govern the
//! transfer engine, logging and metrics output.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Context used for the source channel when none is given.
    #[serde(default = "default_context_name")]
    pub default_context: String,

    /// Named storage contexts.
    #[serde(default)]
    pub contexts: BTreeMap<String, ContextConfig>,

    /// Transfer engine settings.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_context: default_context_name(),
            contexts: BTreeMap::new(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// One storage account and the credential used to reach it.
///
/// Credential fields are consulted in order: `key`, `key_env`,
/// `connection_string`, `sas_token`, `sas_token_env`.  With none set the
/// context is anonymous.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContextConfig {
    /// Storage account name.
    pub account: String,

    /// Blob service endpoint.  Empty means the public cloud endpoint
    /// for `account`.
    #[serde(default)]
    pub endpoint: String,

    /// Base64 account key.
    #[serde(default)]
    pub key: String,

    /// Environment variable holding the account key.
    #[serde(default)]
    pub key_env: String,

    /// Connection string containing `AccountKey=` or `SharedAccessSignature=`.
    #[serde(default)]
    pub connection_string: String,

    /// SAS token.
    #[serde(default)]
    pub sas_token: String,

    /// Environment variable holding a SAS token.
    #[serde(default)]
    pub sas_token_env: String,
}

/// Transfer engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Maximum start-copy requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum queued copy tasks before submission waits.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Seconds to wait for the engine to accept a copy.
    #[serde(default = "default_accept_timeout")]
    pub accept_timeout_seconds: u64,

    /// HTTP timeout for a single storage request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_depth: default_queue_depth(),
            accept_timeout_seconds: default_accept_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Record copy metrics.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Write Prometheus exposition text here after each run.  Empty
    /// disables the file.
    #[serde(default)]
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            metrics_path: String::new(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_context_name() -> String {
    "default".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

fn default_accept_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
