//! In-flight request registry
//!
//! Concurrent requests with the same key share one underlying future. The
//! work runs on its own task, so it settles even if every caller stops
//! waiting, and the task removes its registry entry before publishing the
//! result: a call that starts after settlement always issues fresh work.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::ApiError;

pub type SharedResult<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

/// `METHOD:URL`, the only identity the registry knows about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &reqwest::Method, url: &url::Url) -> Self {
        Self(format!("{}:{}", method, url))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct InFlightRegistry<T: Clone> {
    entries: Arc<Mutex<HashMap<RequestKey, SharedResult<T>>>>,
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the pending entry for `key`, or start `factory` and register it
    ///
    /// Returns the shared result and whether an existing entry was joined.
    pub async fn dedupe<F, Fut>(&self, key: RequestKey, factory: F) -> (SharedResult<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(&key) {
            debug!(%key, "Joining in-flight request");
            return (existing.clone(), true);
        }

        let work = factory();
        let registry = Arc::clone(&self.entries);
        let task_key = key.clone();

        // Blocks on the registry lock until the entry below is inserted
        let task = tokio::spawn(async move {
            let result = work.await;
            registry.lock().await.remove(&task_key);
            result
        });

        let endpoint = key.to_string();
        let shared = async move {
            task.await.unwrap_or_else(|join_error| {
                Err(ApiError::new(
                    super::error::STATUS_UNKNOWN,
                    serde_json::json!({ "request": endpoint, "error": join_error.to_string() }),
                    "request task failed",
                ))
            })
        }
        .boxed()
        .shared();

        entries.insert(key, shared.clone());
        (shared, false)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &RequestKey) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
