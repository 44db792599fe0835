//! Resource scan action
//!
//! Starting a scan begins polling the account's job status right away and
//! then fires the trigger request. The trigger may itself answer with a
//! terminal status (cached scan result); that answer and the poll loop race
//! through the same poller slot, and whichever lands first wins.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::{ApiClient, ApiError, ErrorKind, Params, RequestOptions};
use crate::config::ScanConfig;
use crate::poller::{JobListener, JobOutcome, JobProgress, PollHandle, ScanPoller, StatusReport};

/// The trigger request failed
///
/// On a timeout or server error the backend may still be scanning, so the
/// poll loop keeps running and its handle is returned here.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TriggerFailed {
    #[source]
    pub error: ApiError,
    pub handle: Option<PollHandle>,
}

pub struct ScanRunner {
    client: ApiClient,
    poller: ScanPoller,
    config: ScanConfig,
}

impl ScanRunner {
    pub fn new(client: ApiClient, poller: ScanPoller, config: ScanConfig) -> Self {
        Self {
            client,
            poller,
            config,
        }
    }

    pub fn poller(&self) -> &ScanPoller {
        &self.poller
    }

    /// Trigger a scan for `account` and report its progress to `listener`
    ///
    /// A trigger rejected outright (4xx, cancellation) stops polling without a
    /// terminal callback. Timeouts and server errors leave polling running.
    pub async fn start(
        &self,
        account: &str,
        force: bool,
        listener: Arc<dyn JobListener>,
    ) -> Result<PollHandle, TriggerFailed> {
        let listener = Arc::new(RefreshingListener {
            client: self.client.clone(),
            endpoints: self.config.refresh_endpoints.clone(),
            inner: listener,
        });
        let handle = self.poller.start_polling(account, listener).await;

        let params = Params::new()
            .with("account", account)
            .with_opt("force_refresh", force.then_some(true));
        let options = RequestOptions::builder()
            .retries(1)
            .timeout(self.config.trigger_timeout.as_duration())
            .skip_dedupe(true)
            .build();

        info!(account, force, "Triggering scan");
        let body = match self
            .client
            .post::<Value, Value>(&self.config.trigger_endpoint, None, params, options)
            .await
        {
            Ok(body) => body,
            Err(error) => {
                let keep_polling = matches!(error.kind(), ErrorKind::Timeout | ErrorKind::Server);
                warn!(
                    account,
                    status = error.status,
                    keep_polling,
                    error = %error,
                    "Scan trigger failed"
                );

                let handle = if keep_polling {
                    Some(handle)
                } else {
                    handle.stop().await;
                    None
                };
                return Err(TriggerFailed { error, handle });
            }
        };

        if let StatusReport::Terminal(outcome) = StatusReport::from_value(&body) {
            let resolved = self.poller.resolve(account, outcome).await;
            info!(account, resolved, "Scan answered from the trigger response");
        }

        Ok(handle)
    }

    /// Re-fetch every dependent view for `account`
    pub async fn refresh(&self, account: &str) -> Vec<Result<Value, ApiError>> {
        refresh_views(&self.client, &self.config.refresh_endpoints, account).await
    }
}

async fn refresh_views(
    client: &ApiClient,
    endpoints: &[String],
    account: &str,
) -> Vec<Result<Value, ApiError>> {
    let requests = endpoints.iter().map(|endpoint| {
        let options = RequestOptions::builder().skip_dedupe(true).build();
        client.get::<Value>(endpoint, Params::new().with("account", account), options)
    });

    let results = join_all(requests).await;
    for (endpoint, result) in endpoints.iter().zip(&results) {
        if let Err(err) = result {
            warn!(account, endpoint, status = err.status, error = %err, "View refresh failed");
        }
    }
    results
}

/// Refreshes dependent views before the caller sees a completed scan
struct RefreshingListener {
    client: ApiClient,
    endpoints: Vec<String>,
    inner: Arc<dyn JobListener>,
}

#[async_trait]
impl JobListener for RefreshingListener {
    async fn on_update(&self, job_key: &str, progress: &JobProgress) {
        self.inner.on_update(job_key, progress).await;
    }

    async fn on_terminal(&self, job_key: &str, outcome: &JobOutcome) {
        if outcome.is_completed() {
            refresh_views(&self.client, &self.endpoints, job_key).await;
        }
        self.inner.on_terminal(job_key, outcome).await;
    }
}
