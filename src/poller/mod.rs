//! Long-running job poller
//!
//! A job is keyed by its account name; one live poll loop per key. Each loop
//! owns a [`Slot`]: the cancellation token standing in for the scheduled
//! timer, the listener, and the Job Progress State behind a lock.
//!
//! Listener callbacks run while the slot's state lock is held. That makes
//! callbacks for a job strictly sequential, and it lets `stop()` wait out a
//! callback already in progress: once `stop()` returns, or once `on_terminal`
//! has fired, nothing else is delivered for that loop.

pub mod status;

pub use status::{JobOutcome, JobProgress, JobStatus, StatusReport};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, ApiError, Params, RequestOptions};
use crate::config::PollingConfig;

/// Receives progress for one job
///
/// Callbacks for a job never overlap. A listener must not stop its own job
/// from inside a callback; the loop is already winding down after
/// `on_terminal`.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn on_update(&self, job_key: &str, progress: &JobProgress);

    async fn on_terminal(&self, job_key: &str, outcome: &JobOutcome);
}

/// Adapts a pair of plain closures into a [`JobListener`]
pub struct CallbackListener<U, T> {
    on_update: U,
    on_terminal: T,
}

impl<U, T> CallbackListener<U, T>
where
    U: Fn(&str, &JobProgress) + Send + Sync,
    T: Fn(&str, &JobOutcome) + Send + Sync,
{
    pub fn new(on_update: U, on_terminal: T) -> Self {
        Self {
            on_update,
            on_terminal,
        }
    }
}

#[async_trait]
impl<U, T> JobListener for CallbackListener<U, T>
where
    U: Fn(&str, &JobProgress) + Send + Sync,
    T: Fn(&str, &JobOutcome) + Send + Sync,
{
    async fn on_update(&self, job_key: &str, progress: &JobProgress) {
        (self.on_update)(job_key, progress)
    }

    async fn on_terminal(&self, job_key: &str, outcome: &JobOutcome) {
        (self.on_terminal)(job_key, outcome)
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub status_endpoint: String,
    pub interval: Duration,
    /// Delay after a poll request that failed
    pub error_interval: Duration,
    pub request_timeout: Duration,
    /// Consecutive `not_found` answers tolerated; `None` = keep polling
    pub max_not_found_polls: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollerConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            status_endpoint: config.status_endpoint.clone(),
            interval: config.interval.as_duration(),
            error_interval: config.error_interval.as_duration(),
            request_timeout: config.request_timeout.as_duration(),
            max_not_found_polls: config.max_not_found_polls,
        }
    }
}

#[derive(Clone)]
pub struct ScanPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    client: ApiClient,
    config: PollerConfig,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    generations: AtomicU64,
    shutdown: CancellationToken,
}

struct Slot {
    job_key: String,
    generation: u64,
    /// Cancelled once no further poll may be scheduled
    token: CancellationToken,
    /// Cancelled once the loop is over and callbacks are done
    done: CancellationToken,
    listener: Arc<dyn JobListener>,
    state: AsyncMutex<SlotState>,
}

struct SlotState {
    progress: Option<JobProgress>,
    closed: bool,
    not_found_polls: u32,
}

enum Step {
    Continue,
    Stop,
}

impl ScanPoller {
    pub fn new(client: ApiClient, config: PollerConfig) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                client,
                config,
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }

    /// Begin polling `job_key`; an existing loop for the key is stopped first
    pub async fn start_polling(
        &self,
        job_key: impl Into<String>,
        listener: Arc<dyn JobListener>,
    ) -> PollHandle {
        let job_key = job_key.into();

        let previous = self.inner.lock_slots().remove(&job_key);
        if let Some(previous) = previous {
            debug!(job_key, generation = previous.generation, "Replacing poll loop");
            previous.close().await;
        }

        let slot = Arc::new(Slot {
            job_key: job_key.clone(),
            generation: self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1,
            token: self.inner.shutdown.child_token(),
            done: CancellationToken::new(),
            listener,
            state: AsyncMutex::new(SlotState {
                progress: Some(JobProgress::initializing()),
                closed: false,
                not_found_polls: 0,
            }),
        });

        if self.inner.shutdown.is_cancelled() {
            slot.close().await;
            return PollHandle {
                poller: Arc::clone(&self.inner),
                slot,
            };
        }

        // A concurrent start for the same key may have slipped in meanwhile
        let displaced = self
            .inner
            .lock_slots()
            .insert(job_key.clone(), Arc::clone(&slot));
        if let Some(displaced) = displaced {
            displaced.close().await;
        }

        info!(job_key, generation = slot.generation, "Polling started");
        tokio::spawn(run_loop(Arc::clone(&self.inner), Arc::clone(&slot)));

        PollHandle {
            poller: Arc::clone(&self.inner),
            slot,
        }
    }

    /// Drive `job_key` to a terminal state from outside the poll loop
    ///
    /// Returns `false` when no live loop exists or another path already
    /// reached a terminal state.
    pub async fn resolve(&self, job_key: &str, outcome: JobOutcome) -> bool {
        let Some(slot) = self.inner.slot(job_key) else {
            return false;
        };

        let mut state = slot.state.lock().await;
        if state.closed {
            return false;
        }
        slot.finish(&mut state, outcome).await;
        drop(state);

        self.inner.release(&slot);
        true
    }

    /// Current Job Progress State; `None` when nothing is being polled
    pub async fn progress(&self, job_key: &str) -> Option<JobProgress> {
        let slot = self.inner.slot(job_key)?;
        let state = slot.state.lock().await;
        state.progress.clone()
    }

    pub fn active_jobs(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock_slots().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stop every loop; later `start_polling` calls produce inert handles
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let slots: Vec<Arc<Slot>> = self.inner.lock_slots().drain().map(|(_, s)| s).collect();
        for slot in slots {
            slot.close().await;
        }
        info!("Poller shut down");
    }
}

impl PollerInner {
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, job_key: &str) -> Option<Arc<Slot>> {
        self.lock_slots().get(job_key).cloned()
    }

    /// Drop the map entry, unless it already belongs to a newer loop
    fn release(&self, slot: &Slot) {
        let mut slots = self.lock_slots();
        if slots
            .get(&slot.job_key)
            .is_some_and(|current| current.generation == slot.generation)
        {
            slots.remove(&slot.job_key);
        }
    }

    async fn poll_once(&self, slot: &Slot) -> Result<Value, ApiError> {
        let metrics = self.client.metrics_handle();
        metrics.poll_issued();

        let options = RequestOptions::builder()
            .retries(1)
            .timeout(self.config.request_timeout)
            .skip_dedupe(true)
            .signal(slot.token.clone())
            .build();
        let params = Params::new().with("account", &slot.job_key);

        let result = self
            .client
            .get::<Value>(&self.config.status_endpoint, params, options)
            .await;

        if result.as_ref().is_err_and(|e| !e.is_cancelled()) {
            metrics.poll_failed();
        }
        result
    }
}

async fn run_loop(poller: Arc<PollerInner>, slot: Arc<Slot>) {
    loop {
        if slot.token.is_cancelled() {
            break;
        }

        let delay = match poller.poll_once(&slot).await {
            Ok(body) => {
                let report = StatusReport::from_value(&body);
                match slot.apply(report, &poller).await {
                    Step::Continue => poller.config.interval,
                    Step::Stop => break,
                }
            }
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                warn!(
                    job_key = slot.job_key,
                    status = err.status,
                    error = %err,
                    "Status poll failed, retrying"
                );
                poller.config.error_interval
            }
        };

        tokio::select! {
            _ = slot.token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    // Whatever ended the loop (client shutdown included), the handle must settle
    slot.close().await;
    poller.release(&slot);
    debug!(job_key = slot.job_key, generation = slot.generation, "Poll loop exited");
}

impl Slot {
    async fn apply(&self, report: StatusReport, poller: &PollerInner) -> Step {
        let mut state = self.state.lock().await;
        if state.closed || self.token.is_cancelled() {
            return Step::Stop;
        }

        match report {
            StatusReport::NotFound => {
                state.not_found_polls += 1;
                debug!(job_key = self.job_key, polls = state.not_found_polls, "Job not registered yet");

                let lost = poller
                    .config
                    .max_not_found_polls
                    .is_some_and(|limit| state.not_found_polls > limit);
                if lost {
                    let message = poller.client.locale().job_lost(state.not_found_polls);
                    self.finish(&mut state, JobOutcome::failed(message)).await;
                    return Step::Stop;
                }
                Step::Continue
            }
            StatusReport::Progress(next) => {
                state.not_found_polls = 0;
                let progress = match &state.progress {
                    Some(current) => current.merge(next),
                    None => next,
                };
                self.listener.on_update(&self.job_key, &progress).await;
                state.progress = Some(progress);
                Step::Continue
            }
            StatusReport::Terminal(outcome) => {
                self.finish(&mut state, outcome).await;
                Step::Stop
            }
        }
    }

    /// First terminal transition wins; the caller holds the state lock
    async fn finish(&self, state: &mut SlotState, outcome: JobOutcome) {
        state.closed = true;
        state.progress = None;
        self.token.cancel();

        info!(
            job_key = self.job_key,
            generation = self.generation,
            status = ?outcome.status(),
            "Job reached terminal state"
        );
        self.listener.on_terminal(&self.job_key, &outcome).await;
        self.done.cancel();
    }

    /// Stop without a terminal callback; waits for a callback in progress
    async fn close(&self) {
        self.token.cancel();

        let mut state = self.state.lock().await;
        if !state.closed {
            state.closed = true;
            state.progress = None;
            debug!(job_key = self.job_key, generation = self.generation, "Polling stopped");
        }
        self.done.cancel();
    }
}

/// The stopFn for one poll loop
#[derive(Clone)]
pub struct PollHandle {
    poller: Arc<PollerInner>,
    slot: Arc<Slot>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("job_key", &self.slot.job_key)
            .field("generation", &self.slot.generation)
            .field("active", &self.is_active())
            .finish()
    }
}

impl PollHandle {
    pub fn job_key(&self) -> &str {
        &self.slot.job_key
    }

    pub fn generation(&self) -> u64 {
        self.slot.generation
    }

    pub fn is_active(&self) -> bool {
        !self.slot.done.is_cancelled()
    }

    /// Cancel the loop; no callback is delivered once this returns
    pub async fn stop(&self) {
        self.slot.close().await;
        self.poller.release(&self.slot);
    }

    /// Resolves once the job finished or was stopped
    pub async fn finished(&self) {
        self.slot.done.cancelled().await
    }
}
