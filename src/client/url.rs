//! Target URL composition
//!
//! Precedence for the `account` query parameter:
//! 1. explicit `params.account`
//! 2. the current route, when it looks like `/a/{account}/...`
//! 3. the persisted last-selected account
//! 4. omitted
//!
//! Precedence for `locale`: explicit `params.locale`, then the persisted locale,
//! then the configured default.

use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

use super::options::Params;
use crate::locale::Locale;
use crate::preferences::PreferenceStore;

const ACCOUNT_PARAM: &str = "account";
const LOCALE_PARAM: &str = "locale";

#[derive(Debug)]
pub struct UrlBuilder {
    origin: Url,
    default_locale: String,
    preferences: Arc<PreferenceStore>,
    route: RwLock<Option<String>>,
}

impl UrlBuilder {
    /// `origin` must be absolute; it is resolved once here
    pub fn new(
        origin: &str,
        default_locale: impl Into<String>,
        preferences: Arc<PreferenceStore>,
    ) -> Result<Self, url::ParseError> {
        let origin = Url::parse(origin)?;
        if origin.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithoutBase);
        }

        Ok(Self {
            origin,
            default_locale: default_locale.into(),
            preferences,
            route: RwLock::new(None),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    /// Record the current navigational path (e.g. `/a/acme-prod/budgets`)
    pub fn set_route(&self, path: Option<String>) {
        *self.route.write().unwrap_or_else(PoisonError::into_inner) = path;
    }

    pub fn route_account(&self) -> Option<String> {
        let route = self.route.read().unwrap_or_else(PoisonError::into_inner);
        route.as_deref().and_then(account_from_path)
    }

    pub fn resolve_account(&self, params: &Params) -> Option<String> {
        params
            .get(ACCOUNT_PARAM)
            .map(str::to_string)
            .or_else(|| self.route_account())
            .or_else(|| self.preferences.last_account())
    }

    pub fn resolve_locale(&self, params: &Params) -> String {
        params
            .get(LOCALE_PARAM)
            .map(str::to_string)
            .or_else(|| self.preferences.locale())
            .unwrap_or_else(|| self.default_locale.clone())
    }

    /// The catalog locale used for messages about a request with these params
    pub fn message_locale(&self, params: &Params) -> Locale {
        Locale::resolve(&self.resolve_locale(params))
    }

    pub fn build(&self, endpoint: &str, params: &Params) -> Url {
        let mut url = self.origin.clone();

        let (path, query) = match endpoint.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (endpoint, None),
        };

        // Concatenate rather than `Url::join`, which drops base path segments
        let base_path = self.origin.path().trim_end_matches('/');
        let endpoint_path = path.trim_start_matches('/');
        url.set_path(&format!("{}/{}", base_path, endpoint_path));
        url.set_query(query.filter(|q| !q.is_empty()));
        url.set_fragment(None);

        let account = self.resolve_account(params);
        let locale = self.resolve_locale(params);

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(account) = &account {
                pairs.append_pair(ACCOUNT_PARAM, account);
            }
            pairs.append_pair(LOCALE_PARAM, &locale);
            for (key, value) in params.iter() {
                if key != ACCOUNT_PARAM && key != LOCALE_PARAM {
                    pairs.append_pair(key, value);
                }
            }
        }

        url
    }
}

/// `/a/{account}/...` -> `account`
pub fn account_from_path(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    match (segments.next(), segments.next()) {
        (Some("a"), Some(account)) => Some(account.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(origin: &str) -> UrlBuilder {
        UrlBuilder::new(origin, "en", Arc::new(PreferenceStore::in_memory())).unwrap()
    }

    #[test]
    fn test_explicit_params_win() {
        let urls = builder("https://cost.example.com");
        urls.set_route(Some("/a/from-route/budgets".to_string()));
        urls.preferences().set_last_account(Some("from-prefs".to_string())).unwrap();
        urls.preferences().set_locale(Some("zh".to_string())).unwrap();

        let params = Params::new().with("account", "explicit").with("locale", "en");
        let url = urls.build("/api/budgets", &params);

        assert_eq!(
            url.as_str(),
            "https://cost.example.com/api/budgets?account=explicit&locale=en"
        );
    }

    #[test]
    fn test_route_beats_preferences() {
        let urls = builder("https://cost.example.com");
        urls.preferences().set_last_account(Some("from-prefs".to_string())).unwrap();
        urls.set_route(Some("/a/from-route/alerts?tab=open".to_string()));

        let url = urls.build("/api/alerts", &Params::new());
        assert_eq!(url.query(), Some("account=from-route&locale=en"));
    }

    #[test]
    fn test_preferences_fallback() {
        let urls = builder("https://cost.example.com");
        urls.preferences().set_last_account(Some("from-prefs".to_string())).unwrap();
        urls.preferences().set_locale(Some("zh".to_string())).unwrap();
        urls.set_route(Some("/settings".to_string()));

        let url = urls.build("/api/alerts", &Params::new());
        assert_eq!(url.query(), Some("account=from-prefs&locale=zh"));
    }

    #[test]
    fn test_account_omitted_when_unresolved() {
        let urls = builder("https://cost.example.com");

        let url = urls.build("/api/accounts", &Params::new());
        assert_eq!(url.as_str(), "https://cost.example.com/api/accounts?locale=en");
    }

    #[test]
    fn test_extra_params_sorted_and_nulls_skipped() {
        let urls = builder("https://cost.example.com");
        let params = Params::new()
            .with("period", "30d")
            .with_opt::<&str>("service", None)
            .with("group_by", "region")
            .with("account", "acme");

        let url = urls.build("/api/costs", &params);
        assert_eq!(
            url.query(),
            Some("account=acme&locale=en&group_by=region&period=30d")
        );
    }

    #[test]
    fn test_base_path_and_double_slashes() {
        let urls = builder("https://cost.example.com/v1/");
        let url = urls.build("//api/resources", &Params::new());
        assert_eq!(url.path(), "/v1/api/resources");

        let urls = builder("https://cost.example.com/v1");
        let url = urls.build("api/resources", &Params::new());
        assert_eq!(url.path(), "/v1/api/resources");
    }

    #[test]
    fn test_endpoint_query_is_preserved() {
        let urls = builder("https://cost.example.com");
        let url = urls.build("/api/discounts?status=active", &Params::new().with("page", 2));
        assert_eq!(url.query(), Some("status=active&locale=en&page=2"));
    }

    #[test]
    fn test_values_are_encoded() {
        let urls = builder("https://cost.example.com");
        let url = urls.build("/api/search", &Params::new().with("q", "a&b c"));
        assert_eq!(url.query(), Some("locale=en&q=a%26b+c"));
    }

    #[test]
    fn test_same_inputs_same_url() {
        let urls = builder("https://cost.example.com");
        let a = urls.build("/api/x", &Params::new().with("b", 2).with("a", 1));
        let b = urls.build("/api/x", &Params::new().with("a", 1).with("b", 2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_account_from_path() {
        assert_eq!(account_from_path("/a/acme/budgets").as_deref(), Some("acme"));
        assert_eq!(account_from_path("/a/acme").as_deref(), Some("acme"));
        assert_eq!(account_from_path("/a/").as_deref(), None);
        assert_eq!(account_from_path("/accounts/acme").as_deref(), None);
        assert_eq!(account_from_path("/b/acme").as_deref(), None);
    }

    #[test]
    fn test_relative_origin_rejected() {
        assert!(UrlBuilder::new("/api", "en", Arc::new(PreferenceStore::in_memory())).is_err());
    }
}
