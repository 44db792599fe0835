//! Resilient request layer
//!
//! [`ApiClient`] issues GET/POST/PUT/DELETE calls against a single backend
//! origin. Each call goes through the same pipeline:
//!
//! 1. [`UrlBuilder`] composes the absolute URL (account/locale precedence)
//! 2. [`InFlightRegistry`] collapses concurrent identical `METHOD:URL` calls
//! 3. [`retry::execute`] runs attempts with per-attempt deadlines and backoff
//! 4. every failure reaches the caller as one [`ApiError`]

pub mod dedupe;
pub mod error;
pub mod options;
pub mod response;
pub mod retry;
pub mod url;

pub use dedupe::{InFlightRegistry, RequestKey};
pub use error::{ApiError, ErrorKind};
pub use options::{Params, RequestOptions};
pub use retry::RetryPolicy;
pub use url::UrlBuilder;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::{ApiConfig, Config, RequestConfig};
use crate::locale::Locale;
use crate::observability::{Metrics, MetricsSnapshot};
use crate::preferences::{PreferenceError, PreferenceStore};
use retry::{AttemptContext, HttpReply, TransportError};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

type SharedBody = Arc<Value>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid API origin: {0}")]
    InvalidOrigin(#[from] ::url::ParseError),

    #[error("HTTP client construction failed: {0}")]
    Build(#[from] reqwest::Error),
}

/// Handle to the request layer; clones share the registry and settings
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    urls: UrlBuilder,
    defaults: RequestConfig,
    inflight: InFlightRegistry<SharedBody>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

impl ApiClient {
    pub fn new(config: &Config, preferences: Arc<PreferenceStore>) -> Result<Self, ClientError> {
        Self::with_parts(&config.api, config.requests.clone(), preferences)
    }

    pub fn with_parts(
        api: &ApiConfig,
        defaults: RequestConfig,
        preferences: Arc<PreferenceStore>,
    ) -> Result<Self, ClientError> {
        let urls = UrlBuilder::new(&api.base_url, api.default_locale.clone(), preferences)?;

        // Deadlines are enforced per attempt by the retry engine
        let http = reqwest::Client::builder()
            .connect_timeout(api.connect_timeout.as_duration())
            .user_agent(&api.user_agent)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                urls,
                defaults,
                inflight: InFlightRegistry::new(),
                metrics: Arc::new(Metrics::new()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, endpoint, None, params, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = self.encode_body(endpoint, body, &params)?;
        self.request(Method::POST, endpoint, body, params, options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = self.encode_body(endpoint, body, &params)?;
        self.request(Method::PUT, endpoint, body, params, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::DELETE, endpoint, None, params, options).await
    }

    /// Any method, decoded into `T`
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Bytes>,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let locale = self.inner.urls.message_locale(&params);
        let value = self.send(method, endpoint, body, params, options).await?;
        T::deserialize(value.as_ref()).map_err(|e| ApiError::unexpected(endpoint, e, locale))
    }

    /// Record the current navigational path (`/a/{account}/...`)
    pub fn navigate(&self, path: impl Into<String>) {
        self.inner.urls.set_route(Some(path.into()));
    }

    pub fn clear_route(&self) {
        self.inner.urls.set_route(None);
    }

    /// Persist the last selected account
    pub fn select_account(&self, account: impl Into<String>) -> Result<(), PreferenceError> {
        self.inner.urls.preferences().set_last_account(Some(account.into()))
    }

    /// Persist the locale preference
    pub fn select_locale(&self, locale: impl Into<String>) -> Result<(), PreferenceError> {
        self.inner.urls.preferences().set_locale(Some(locale.into()))
    }

    pub fn urls(&self) -> &UrlBuilder {
        &self.inner.urls
    }

    /// Catalog locale for messages, from preferences or the configured default
    pub fn locale(&self) -> Locale {
        self.inner.urls.message_locale(&Params::new())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn metrics_handle(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Number of requests currently registered for deduplication
    pub async fn in_flight(&self) -> usize {
        self.inner.inflight.len().await
    }

    /// Abort every in-flight attempt and fail later calls fast
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn policy_for(&self, method: &Method, options: &RequestOptions) -> RetryPolicy {
        let defaults = &self.inner.defaults;
        let is_get = *method == Method::GET;

        let (retries, timeout) = if is_get {
            (defaults.get_retries, defaults.get_timeout)
        } else {
            (defaults.mutation_retries, defaults.mutation_timeout)
        };

        RetryPolicy {
            retries: options.retries.unwrap_or(retries),
            timeout: options.timeout.unwrap_or(timeout.as_duration()),
            backoff_base: defaults.backoff_base.as_duration(),
            timeout_backoff_base: is_get.then(|| defaults.timeout_backoff_base.as_duration()),
        }
    }

    fn encode_body<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        params: &Params,
    ) -> Result<Option<Bytes>, ApiError> {
        body.map(|b| {
            serde_json::to_vec(b).map(Bytes::from).map_err(|e| {
                ApiError::unexpected(endpoint, e, self.inner.urls.message_locale(params))
            })
        })
        .transpose()
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Bytes>,
        params: Params,
        options: RequestOptions,
    ) -> Result<SharedBody, ApiError> {
        let url = self.inner.urls.build(endpoint, &params);
        let locale = self.inner.urls.message_locale(&params);
        let policy = self.policy_for(&method, &options);

        if self.is_shut_down() {
            return Err(ApiError::cancelled(endpoint, locale));
        }

        let call = RequestCall {
            client: self.clone(),
            method: method.clone(),
            url,
            endpoint: endpoint.to_string(),
            body,
            locale,
            policy,
        };

        if options.skip_dedupe {
            return call.run(options.signal.as_ref()).await;
        }

        let key = RequestKey::new(&method, &call.url);
        let (shared, joined) = self
            .inner
            .inflight
            .dedupe(key, move || async move { call.run(None).await })
            .await;

        if joined {
            self.inner.metrics.dedupe_hit();
        }

        // A caller's signal abandons its own wait; the shared request keeps going
        match &options.signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => Err(ApiError::cancelled(endpoint, locale)),
                result = shared => result,
            },
            None => shared.await,
        }
    }
}

/// One logical request, owned so it can run on a spawned task
struct RequestCall {
    client: ApiClient,
    method: Method,
    url: ::url::Url,
    endpoint: String,
    body: Option<Bytes>,
    locale: Locale,
    policy: RetryPolicy,
}

impl RequestCall {
    async fn run(self, signal: Option<&CancellationToken>) -> Result<SharedBody, ApiError> {
        let inner = &self.client.inner;
        let request_id = Uuid::now_v7().to_string();

        debug!(
            method = %self.method,
            url = %self.url,
            request_id,
            attempts = self.policy.attempts(),
            "Dispatching request"
        );

        let ctx = AttemptContext {
            endpoint: &self.endpoint,
            locale: self.locale,
            metrics: &inner.metrics,
            signal,
            shutdown: &inner.shutdown,
        };

        let value = retry::execute(&self.policy, &ctx, |_| self.attempt_once(&request_id)).await?;
        Ok(Arc::new(value))
    }

    async fn attempt_once(&self, request_id: &str) -> Result<HttpReply, TransportError> {
        let mut request = self
            .client
            .inner
            .http
            .request(self.method.clone(), self.url.clone())
            .header(REQUEST_ID_HEADER, request_id);

        if let Some(body) = &self.body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpReply { status, body })
    }
}
