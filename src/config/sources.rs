use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "COSTDASH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/costdash.toml";
const ENV_PREFIX: &str = "COSTDASH";
const ENV_SEPARATOR: &str = "__";

/// Resolve the configuration file path: `COSTDASH_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    load_from_sources(default_path())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // COSTDASH__API__BASE_URL -> api.base_url
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.api.default_locale, "en");
        assert_eq!(config.requests.get_timeout.as_millis(), 30_000);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[api]
base_url = "https://cost.example.com/v1"
default_locale = "zh"

[requests]
get_retries = 5
get_timeout = "45s"
backoff_base = "200ms"
timeout_backoff_base = "300ms"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.api.base_url, "https://cost.example.com/v1");
        assert_eq!(config.api.default_locale, "zh");
        assert_eq!(config.requests.get_retries, 5);
        assert_eq!(config.requests.get_timeout.as_millis(), 45_000);
        assert_eq!(config.requests.backoff_base.as_millis(), 200);
        assert_eq!(config.requests.timeout_backoff_base.as_millis(), 300);
    }

    #[test]
    fn test_complex_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[api]
base_url = "http://127.0.0.1:9000"
user_agent = "costdash-test/1.0"
connect_timeout = "3s"

[polling]
status_endpoint = "/api/jobs/status"
interval = "500ms"
error_interval = "1500ms"
max_not_found_polls = 20

[scan]
trigger_endpoint = "/api/jobs/scan"
trigger_timeout = "2m"
refresh_endpoints = ["/api/budgets", "/api/alerts", "/api/security"]

[preferences]
path = "state/prefs.toml"

[telemetry]
log_filter = "costdash=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();

        assert_eq!(config.api.user_agent, "costdash-test/1.0");
        assert_eq!(config.api.connect_timeout.as_millis(), 3000);

        assert_eq!(config.polling.status_endpoint, "/api/jobs/status");
        assert_eq!(config.polling.interval.as_millis(), 500);
        assert_eq!(config.polling.max_not_found_polls, Some(20));

        assert_eq!(config.scan.trigger_timeout.as_millis(), 120_000);
        assert_eq!(config.scan.refresh_endpoints.len(), 3);

        assert_eq!(config.preferences.path, PathBuf::from("state/prefs.toml"));
        assert_eq!(config.telemetry.log_filter, "costdash=debug");
    }
}
