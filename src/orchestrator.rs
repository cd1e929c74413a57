//! Acquisition state machine
//!
//! `idle -> checking_cache -> { success | fetching }`,
//! `fetching -> { success | webview }`,
//! `webview -> { success | needs_verification }`,
//! `needs_verification -> success`.
//!
//! `success` is terminal until [`AcquisitionOrchestrator::start`] or
//! [`AcquisitionOrchestrator::force_refresh`] runs the pipeline again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::DataCache;
use crate::config::{BackoffConfig, BadevandConfig, SourceConfig};
use crate::error::BadevandError;
use crate::fetch::BeachSource;
use crate::models::{BeachRecord, RawBeach};
use crate::scrape::{
    BrowserHost, DataLatch, HostError, ScrapeSession, SessionEvent, SessionTiming, sleep_until_opt,
};
use crate::transform::transform_beaches;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
    Idle,
    CheckingCache,
    Fetching,
    Webview,
    NeedsVerification,
    Success,
}

impl LoaderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LoaderStatus::Idle => "idle",
            LoaderStatus::CheckingCache => "checking_cache",
            LoaderStatus::Fetching => "fetching",
            LoaderStatus::Webview => "webview",
            LoaderStatus::NeedsVerification => "needs_verification",
            LoaderStatus::Success => "success",
        }
    }
}

impl fmt::Display for LoaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications for the UI
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Status(LoaderStatus),
    /// Recoverable embedded-browser failure; retrying is offered
    LoadFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Respect a cache that became valid in the meantime
    #[default]
    Soft,
    /// Skip the cache check and always fetch
    Hard,
}

/// Where a run enters the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Cache,
    Fetch,
    Webview,
}

impl From<RefreshMode> for Entry {
    fn from(mode: RefreshMode) -> Self {
        match mode {
            RefreshMode::Soft => Entry::Cache,
            RefreshMode::Hard => Entry::Fetch,
        }
    }
}

enum Wake {
    Event(Option<SessionEvent>),
    Retry,
    Verify,
}

/// Growing delay between automatic retries
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), `None` once exhausted
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        Some(if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        })
    }
}

struct Shared {
    cache: Arc<DataCache>,
    source: Arc<dyn BeachSource>,
    host: Arc<dyn BrowserHost>,
    source_config: SourceConfig,
    timing: SessionTiming,
    backoff: BackoffPolicy,
    latch: DataLatch,
    status: watch::Sender<LoaderStatus>,
    events: broadcast::Sender<OrchestratorEvent>,
    session: Mutex<Option<ScrapeSession>>,
}

/// Drives direct fetch, scrape fallback and verification into the cache
pub struct AcquisitionOrchestrator {
    shared: Arc<Shared>,
    task: StdMutex<Option<JoinHandle<()>>>,
    /// Set by `shutdown` until the next start
    halted: AtomicBool,
}

impl AcquisitionOrchestrator {
    pub fn new(
        cache: Arc<DataCache>,
        source: Arc<dyn BeachSource>,
        host: Arc<dyn BrowserHost>,
        config: &BadevandConfig,
    ) -> Self {
        let (status, _) = watch::channel(LoaderStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                cache,
                source,
                host,
                source_config: config.source.clone(),
                timing: SessionTiming::from(&config.acquisition),
                backoff: BackoffPolicy::from(&config.acquisition.backoff),
                latch: DataLatch::new(),
                status,
                events,
                session: Mutex::new(None),
            }),
            task: StdMutex::new(None),
            halted: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn status(&self) -> LoaderStatus {
        *self.shared.status.borrow()
    }

    /// Latest status, for consumers that only need the current state
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<LoaderStatus> {
        self.shared.status.subscribe()
    }

    /// Every transition and load failure, in order
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.shared.events.subscribe()
    }

    pub async fn records(&self) -> Vec<BeachRecord> {
        self.shared.cache.records().await
    }

    /// Run the pipeline in the background, as on a cold start
    ///
    /// A run already in progress is stopped first.
    pub async fn start(&self) {
        self.restart(Entry::Cache).await;
    }

    /// Drop the cache and run the pipeline again
    pub async fn force_refresh(&self, mode: RefreshMode) -> Result<(), BadevandError> {
        info!(?mode, "Forced refresh");
        self.stop().await;
        self.shared
            .cache
            .clear()
            .await
            .map_err(|e| BadevandError::cache(format!("{e:#}")))?;
        self.restart(mode.into()).await;
        Ok(())
    }

    /// Reload the embedded browser, e.g. after the user solved a challenge
    ///
    /// Without a live browser, for instance after it repeatedly failed to
    /// load, the webview phase starts over. Once data is accepted there is
    /// nothing to reload.
    pub async fn reload_webview(&self) -> Result<(), BadevandError> {
        {
            let session = self.shared.session.lock().await;
            if let Some(session) = session.as_ref() {
                return Ok(session.reload()?);
            }
        }
        if self.halted.load(Ordering::Acquire) || self.status() == LoaderStatus::Success {
            return Err(HostError::Closed.into());
        }
        info!("No embedded browser running, restarting the webview phase");
        self.restart(Entry::Webview).await;
        Ok(())
    }

    /// Stop all background work and release the browser
    pub async fn shutdown(&self) {
        self.halted.store(true, Ordering::Release);
        self.stop().await;
        debug!("Orchestrator shut down");
    }

    async fn restart(&self, entry: Entry) {
        self.stop().await;
        self.halted.store(false, Ordering::Release);
        self.shared.latch.reset();
        self.spawn(entry);
    }

    fn spawn(&self, entry: Entry) {
        if entry != Entry::Webview {
            self.shared.transition(LoaderStatus::Idle);
        }
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move { shared.run(entry).await });
        if let Ok(mut task) = self.task.lock() {
            if let Some(previous) = task.replace(handle) {
                previous.abort();
            }
        }
    }

    async fn stop(&self) {
        let previous = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(previous) = previous {
            previous.abort();
            let _ = previous.await;
        }
        self.shared.release_session().await;
    }
}

impl Drop for AcquisitionOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
        if let Ok(mut session) = self.shared.session.try_lock() {
            // Dropping the handle stops the session and closes the browser
            session.take();
        }
    }
}

impl Shared {
    fn transition(&self, status: LoaderStatus) {
        info!(status = %status, "Acquisition status changed");
        self.status.send_replace(status);
        let _ = self.events.send(OrchestratorEvent::Status(status));
    }

    async fn run(self: Arc<Self>, entry: Entry) {
        if entry == Entry::Cache {
            self.transition(LoaderStatus::CheckingCache);
            if self.cache.is_valid().await {
                info!("Cached beach data is still valid");
                self.latch.try_set();
                self.transition(LoaderStatus::Success);
                return;
            }
        }

        if entry != Entry::Webview {
            self.transition(LoaderStatus::Fetching);
            match self.source.fetch().await {
                Ok(beaches) => {
                    self.accept(beaches).await;
                    return;
                }
                Err(e) => warn!("Direct fetch failed, falling back to embedded browser: {}", e),
            }
        }

        if *self.status.borrow() != LoaderStatus::Webview {
            self.transition(LoaderStatus::Webview);
        }
        if let Some(events) = self.open_session().await {
            self.watch_session(events).await;
        }
        self.release_session().await;
    }

    /// Start a browser session, retrying failed loads under the backoff policy
    async fn open_session(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.release_session().await;
        let mut attempt = 0;
        loop {
            let (tx, rx) = mpsc::unbounded_channel();
            match ScrapeSession::start(self.host.clone(), &self.source_config, self.timing, tx).await {
                Ok(session) => {
                    *self.session.lock().await = Some(session);
                    return Some(rx);
                }
                Err(e) => {
                    warn!("Embedded browser could not start: {}", e);
                    self.load_failed(e.to_string());
                    attempt += 1;
                    let Some(delay) = self.backoff.delay(attempt) else {
                        warn!(attempt, "Giving up starting the embedded browser, waiting for the user");
                        return None;
                    };
                    debug!(attempt, ?delay, "Restarting embedded browser after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Consume session events until data is accepted
    ///
    /// Automatic reloads and the verification deadline are timers of their
    /// own, so events keep flowing while a reload is pending.
    async fn watch_session(&self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let mut failures = 0;
        let mut retry_at: Option<Instant> = None;
        let mut verify_at = Some(Instant::now() + self.timing.verification_timeout);

        loop {
            let wake = tokio::select! {
                event = events.recv() => Wake::Event(event),
                () = sleep_until_opt(retry_at), if retry_at.is_some() => Wake::Retry,
                () = sleep_until_opt(verify_at), if verify_at.is_some() => Wake::Verify,
            };

            match wake {
                Wake::Event(None) => break,
                Wake::Event(Some(SessionEvent::Payload { beaches, source })) => {
                    debug!(?source, "Payload from embedded browser");
                    self.accept(beaches).await;
                    break;
                }
                Wake::Event(Some(SessionEvent::NeedsVerification)) | Wake::Verify => {
                    verify_at = None;
                    self.request_verification();
                }
                Wake::Event(Some(SessionEvent::LoadFailed(message))) => {
                    self.load_failed(message);
                    failures += 1;
                    if retry_at.is_none() {
                        retry_at = self.schedule_retry(failures);
                    }
                }
                Wake::Retry => {
                    retry_at = None;
                    self.reload_session().await;
                }
            }
        }
    }

    /// First accepted payload wins; later ones are dropped
    async fn accept(&self, beaches: Vec<RawBeach>) {
        if !self.latch.try_set() {
            debug!("Ignoring payload, data already accepted");
            return;
        }

        let records = transform_beaches(&beaches);
        info!(records = records.len(), "Accepted beach data");
        if let Err(e) = self.cache.write(records).await {
            // The in-memory copy is already updated
            warn!("Failed to persist beach data: {:#}", e);
        }
        self.transition(LoaderStatus::Success);
    }

    fn load_failed(&self, message: String) {
        let _ = self.events.send(OrchestratorEvent::LoadFailed { message });
    }

    fn request_verification(&self) {
        if !self.latch.is_set() && *self.status.borrow() != LoaderStatus::NeedsVerification {
            self.transition(LoaderStatus::NeedsVerification);
        }
    }

    fn schedule_retry(&self, attempt: u32) -> Option<Instant> {
        let Some(delay) = self.backoff.delay(attempt) else {
            warn!(attempt, "Giving up automatic reloads, waiting for the user");
            return None;
        };
        debug!(attempt, ?delay, "Reloading embedded browser after backoff");
        Some(Instant::now() + delay)
    }

    async fn reload_session(&self) {
        let session = self.session.lock().await;
        if let Some(session) = session.as_ref() {
            if let Err(e) = session.reload() {
                warn!("Automatic reload failed: {}", e);
            }
        }
    }

    async fn release_session(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, Some(1000))]
    #[case(2, Some(2000))]
    #[case(3, Some(4000))]
    #[case(4, None)]
    #[case(0, None)]
    fn test_backoff_delays(#[case] attempt: u32, #[case] expected_ms: Option<u64>) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(attempt), expected_ms.map(Duration::from_millis));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(10),
            multiplier: 10.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 50,
        };
        assert_eq!(policy.delay(2), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay(50), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(LoaderStatus::CheckingCache.to_string(), "checking_cache");
        assert_eq!(
            serde_json::to_string(&LoaderStatus::NeedsVerification).unwrap(),
            "\"needs_verification\""
        );
    }
}
