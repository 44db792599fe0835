//! Per-request options and query parameters

use bon::Builder;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options recognized by every request method
///
/// Unset values fall back to the per-method defaults from configuration.
#[derive(Debug, Clone, Default, Builder)]
pub struct RequestOptions {
    /// Total attempt count (1 = no retry)
    pub retries: Option<u32>,
    /// Per-attempt deadline
    pub timeout: Option<Duration>,
    /// Bypass the in-flight registry entirely
    #[builder(default)]
    pub skip_dedupe: bool,
    /// Caller-owned cancellation
    pub signal: Option<CancellationToken>,
}

/// Query parameters; `None` values are dropped when the URL is built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, Option<String>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.0.insert(key.into(), Some(value.to_string()));
        self
    }

    pub fn with_opt<V: Display>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.0.insert(key.into(), value.map(|v| v.to_string()));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.insert(key.into(), value);
    }

    /// The value for `key`, if present and not null
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    /// Present, non-null entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Params::new(), |params, (k, v)| params.with(k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let options = RequestOptions::builder().build();
        assert!(options.retries.is_none());
        assert!(options.timeout.is_none());
        assert!(!options.skip_dedupe);
        assert!(options.signal.is_none());

        let options = RequestOptions::builder()
            .retries(3)
            .timeout(Duration::from_millis(100))
            .skip_dedupe(true)
            .build();
        assert_eq!(options.retries, Some(3));
        assert!(options.skip_dedupe);
    }

    #[test]
    fn test_params_skip_nulls() {
        let params = Params::new()
            .with("period", "30d")
            .with_opt::<String>("region", None)
            .with("limit", 50);

        assert_eq!(params.get("limit"), Some("50"));
        assert_eq!(params.get("region"), None);

        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("limit", "50"), ("period", "30d")]);
    }

    #[test]
    fn test_params_from_iter() {
        let params: Params = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(params.get("b"), Some("2"));
    }
}
