use super::models::Config;
use crate::client::retry::MAX_ATTEMPTS;
use crate::locale::Locale;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("api.base_url '{url}' is not an absolute http(s) URL")]
    InvalidBaseUrl { url: String },

    #[error("Unsupported default locale '{locale}'")]
    UnsupportedLocale { locale: String },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("Retry count must be at least 1: {field}")]
    ZeroRetries { field: &'static str },

    #[error("Retry count for {field} must not exceed {max}")]
    TooManyRetries { field: &'static str, max: u32 },

    #[error(
        "timeout_backoff_base ({timeout_ms}ms) must be >= backoff_base ({base_ms}ms) and < twice it"
    )]
    BackoffRatio { base_ms: u64, timeout_ms: u64 },

    #[error("Endpoint '{endpoint}' for {field} must start with '/'")]
    InvalidEndpoint { field: &'static str, endpoint: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_api(config)?;
    validate_requests(config)?;
    validate_polling(config)?;
    validate_scan(config)?;
    Ok(())
}

fn validate_api(config: &Config) -> Result<(), ValidationError> {
    let url = Url::parse(&config.api.base_url).map_err(|_| ValidationError::InvalidBaseUrl {
        url: config.api.base_url.clone(),
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ValidationError::InvalidBaseUrl {
            url: config.api.base_url.clone(),
        });
    }

    if config.api.default_locale.parse::<Locale>().is_err() {
        return Err(ValidationError::UnsupportedLocale {
            locale: config.api.default_locale.clone(),
        });
    }

    Ok(())
}

/// Retry counts, timeouts, and the backoff ratio that keeps delays strictly increasing
fn validate_requests(config: &Config) -> Result<(), ValidationError> {
    let requests = &config.requests;

    for (field, retries) in [
        ("requests.get_retries", requests.get_retries),
        ("requests.mutation_retries", requests.mutation_retries),
    ] {
        if retries == 0 {
            return Err(ValidationError::ZeroRetries { field });
        }
        if retries > MAX_ATTEMPTS {
            return Err(ValidationError::TooManyRetries { field, max: MAX_ATTEMPTS });
        }
    }

    for (field, value) in [
        ("requests.get_timeout", requests.get_timeout),
        ("requests.mutation_timeout", requests.mutation_timeout),
        ("requests.backoff_base", requests.backoff_base),
    ] {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration { field });
        }
    }

    // base*2^(i+1) > timeout_base*2^i and timeout_base*2^(i+1) > base*2^i
    let base_ms = requests.backoff_base.as_millis();
    let timeout_ms = requests.timeout_backoff_base.as_millis();
    if timeout_ms < base_ms || timeout_ms >= base_ms * 2 {
        return Err(ValidationError::BackoffRatio { base_ms, timeout_ms });
    }

    Ok(())
}

fn validate_polling(config: &Config) -> Result<(), ValidationError> {
    let polling = &config.polling;

    check_endpoint("polling.status_endpoint", &polling.status_endpoint)?;

    for (field, value) in [
        ("polling.interval", polling.interval),
        ("polling.error_interval", polling.error_interval),
        ("polling.request_timeout", polling.request_timeout),
    ] {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration { field });
        }
    }

    Ok(())
}

fn validate_scan(config: &Config) -> Result<(), ValidationError> {
    check_endpoint("scan.trigger_endpoint", &config.scan.trigger_endpoint)?;
    for endpoint in &config.scan.refresh_endpoints {
        check_endpoint("scan.refresh_endpoints", endpoint)?;
    }

    if config.scan.trigger_timeout.is_zero() {
        return Err(ValidationError::ZeroDuration { field: "scan.trigger_timeout" });
    }

    Ok(())
}

fn check_endpoint(field: &'static str, endpoint: &str) -> Result<(), ValidationError> {
    if !endpoint.starts_with('/') {
        return Err(ValidationError::InvalidEndpoint {
            field,
            endpoint: endpoint.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_relative_base_url_rejected() {
        let mut config = Config::default();
        config.api.base_url = "/api".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let mut config = Config::default();
        config.api.base_url = "ftp://files.example.com".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_unknown_default_locale_rejected() {
        let mut config = Config::default();
        config.api.default_locale = "tlh".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnsupportedLocale { .. })
        ));
    }

    #[test]
    fn test_backoff_ratio_enforced() {
        let mut config = Config::default();
        config.requests.backoff_base = HumanDuration::from_millis(1000);
        config.requests.timeout_backoff_base = HumanDuration::from_millis(2000);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::BackoffRatio { base_ms: 1000, timeout_ms: 2000 })
        ));

        config.requests.timeout_backoff_base = HumanDuration::from_millis(900);
        assert!(validate(&config).is_err());

        config.requests.timeout_backoff_base = HumanDuration::from_millis(1000);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = Config::default();
        config.requests.get_retries = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroRetries { field: "requests.get_retries" })
        ));
    }

    #[test]
    fn test_retries_above_cap_rejected() {
        let mut config = Config::default();
        config.requests.mutation_retries = MAX_ATTEMPTS;
        assert!(validate(&config).is_ok());

        config.requests.mutation_retries = MAX_ATTEMPTS + 1;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::TooManyRetries { field: "requests.mutation_retries", max: 21 })
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.polling.interval = HumanDuration::from_millis(0);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration { field: "polling.interval" })
        ));
    }

    #[test]
    fn test_endpoint_without_slash_rejected() {
        let mut config = Config::default();
        config.scan.refresh_endpoints.push("api/budgets".to_string());

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidEndpoint { .. })
        ));
    }
}
