use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub requests: RequestConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Backend origin and client identity
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Absolute API origin; every endpoint is rooted here
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Locale used when neither the call nor the preferences name one
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_locale: default_locale(),
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_user_agent() -> String {
    "costdash/0.1.0".to_string()
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// Per-method retry and timeout defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestConfig {
    #[serde(default = "default_get_retries")]
    pub get_retries: u32,
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,
    #[serde(default = "default_get_timeout")]
    pub get_timeout: HumanDuration,
    #[serde(default = "default_mutation_timeout")]
    pub mutation_timeout: HumanDuration,
    /// Base delay for generic retryable failures
    #[serde(default = "default_backoff_base")]
    pub backoff_base: HumanDuration,
    /// Base delay after a GET attempt timed out
    #[serde(default = "default_timeout_backoff_base")]
    pub timeout_backoff_base: HumanDuration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            get_retries: default_get_retries(),
            mutation_retries: default_mutation_retries(),
            get_timeout: default_get_timeout(),
            mutation_timeout: default_mutation_timeout(),
            backoff_base: default_backoff_base(),
            timeout_backoff_base: default_timeout_backoff_base(),
        }
    }
}

fn default_get_retries() -> u32 {
    3
}

fn default_mutation_retries() -> u32 {
    1
}

fn default_get_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_mutation_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_backoff_base() -> HumanDuration {
    HumanDuration::from_millis(1000)
}

fn default_timeout_backoff_base() -> HumanDuration {
    HumanDuration::from_millis(1500)
}

/// Long-running job status polling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub interval: HumanDuration,
    /// Delay before the next poll after the status request itself failed
    #[serde(default = "default_poll_error_interval")]
    pub error_interval: HumanDuration,
    #[serde(default = "default_poll_request_timeout")]
    pub request_timeout: HumanDuration,
    /// Give up after this many consecutive `not_found` reports (unbounded when unset)
    #[serde(default)]
    pub max_not_found_polls: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_endpoint: default_status_endpoint(),
            interval: default_poll_interval(),
            error_interval: default_poll_error_interval(),
            request_timeout: default_poll_request_timeout(),
            max_not_found_polls: None,
        }
    }
}

fn default_status_endpoint() -> String {
    "/api/scan/status".to_string()
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_poll_error_interval() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_poll_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// The dashboard "scan" action
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default = "default_trigger_endpoint")]
    pub trigger_endpoint: String,
    #[serde(default = "default_trigger_timeout")]
    pub trigger_timeout: HumanDuration,
    /// Views re-fetched once a scan completes
    #[serde(default = "default_refresh_endpoints")]
    pub refresh_endpoints: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            trigger_endpoint: default_trigger_endpoint(),
            trigger_timeout: default_trigger_timeout(),
            refresh_endpoints: default_refresh_endpoints(),
        }
    }
}

fn default_trigger_endpoint() -> String {
    "/api/scan".to_string()
}

fn default_trigger_timeout() -> HumanDuration {
    HumanDuration::from_secs(300)
}

fn default_refresh_endpoints() -> Vec<String> {
    vec!["/api/dashboard".to_string(), "/api/resources".to_string()]
}

/// Locally persisted UI preferences
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_preferences_path")]
    pub path: PathBuf,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
        }
    }
}

fn default_preferences_path() -> PathBuf {
    PathBuf::from("data/preferences.toml")
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber` filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
