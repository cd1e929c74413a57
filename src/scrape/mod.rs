//! Embedded-browser fallback for acquiring the beach dataset
//!
//! The session loads the public website off-screen, installs the interception
//! script and then waits for any detection path to produce a payload. The
//! script's fetch and XHR wraps report through the message bridge; the body and
//! navigation polls run here on the host side. Every path feeds [`DataLatch`],
//! so only the first payload per arming is forwarded.

pub mod host;
pub mod protocol;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{AcquisitionConfig, SourceConfig};
use crate::models::{RawBeach, decode_beach_list};
use crate::validate::parse_page_payload;

pub use host::{BrowserHost, HostError, HostEvent, HostEventReceiver, HostEventSender, LoadRequest};
pub use protocol::{DetectionPath, PageMessage, interception_script, is_tls_noise};

const MIN_POLL_PERIOD: Duration = Duration::from_millis(10);

/// Single-writer latch, the first `try_set` wins
#[derive(Debug, Default)]
pub struct DataLatch {
    set: AtomicBool,
}

impl DataLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that flipped the latch
    pub fn try_set(&self) -> bool {
        self.set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.set.store(false, Ordering::Release);
    }
}

/// Timers driving a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub verification_timeout: Duration,
    pub body_poll: Duration,
    pub navigation_poll: Duration,
    pub navigation_recheck: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from(&AcquisitionConfig::default())
    }
}

impl From<&AcquisitionConfig> for SessionTiming {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            verification_timeout: config.verification_timeout(),
            body_poll: config.body_poll(),
            navigation_poll: config.navigation_poll(),
            navigation_recheck: config.navigation_recheck(),
        }
    }
}

/// What a session reports to its owner
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// First valid payload since the last arming
    Payload {
        beaches: Vec<RawBeach>,
        source: DetectionPath,
    },
    /// No payload arrived before the verification timeout
    NeedsVerification,
    /// Recoverable load error, TLS noise excluded
    LoadFailed(String),
}

#[derive(Debug)]
enum Command {
    Reload,
    Shutdown,
}

/// Handle to a running scrape session
///
/// Dropping the handle stops the session and closes the browser instance.
pub struct ScrapeSession {
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl ScrapeSession {
    /// Load the website in `host` and start watching for a payload
    ///
    /// The verification clock starts when this is called.
    pub async fn start(
        host: Arc<dyn BrowserHost>,
        source: &SourceConfig,
        timing: SessionTiming,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, HostError> {
        let armed_at = Instant::now();
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let script = interception_script(&source.endpoint_pattern, host.message_bridge());

        host.load(LoadRequest {
            url: source.website_url.clone(),
            before_content_script: script.clone(),
            after_load_script: script,
            events: host_tx.clone(),
        })
        .await?;
        info!(url = %source.website_url, "Embedded browser loading website");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let session = SessionLoop {
            host,
            endpoint_pattern: source.endpoint_pattern.clone(),
            timing,
            latch: DataLatch::new(),
            deadline: Some(armed_at + timing.verification_timeout),
            recheck_at: None,
            last_url: None,
            host_events: host_rx,
            _host_tx: host_tx,
            commands: command_rx,
            events,
        };

        Ok(Self {
            commands: command_tx,
            task: Some(tokio::spawn(session.run())),
        })
    }

    /// Reload the page, re-arming the latch and the verification clock
    pub fn reload(&self) -> Result<(), HostError> {
        self.commands
            .send(Command::Reload)
            .map_err(|_| HostError::Closed)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop every timer, close the browser and wait for the session to end
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Scrape session task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ScrapeSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

enum Step {
    Host(HostEvent),
    Command(Option<Command>),
    BodyPoll,
    NavigationPoll,
    Recheck,
    Deadline,
}

struct SessionLoop {
    host: Arc<dyn BrowserHost>,
    endpoint_pattern: String,
    timing: SessionTiming,
    latch: DataLatch,
    deadline: Option<Instant>,
    recheck_at: Option<Instant>,
    last_url: Option<String>,
    host_events: HostEventReceiver,
    // Keeps `host_events` open if the host drops its sender
    _host_tx: HostEventSender,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

pub(crate) async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl SessionLoop {
    async fn run(mut self) {
        let body_period = self.timing.body_poll.max(MIN_POLL_PERIOD);
        let navigation_period = self.timing.navigation_poll.max(MIN_POLL_PERIOD);
        let started = Instant::now();

        let mut body_poll = time::interval_at(started + body_period, body_period);
        body_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut navigation_poll = time::interval_at(started + navigation_period, navigation_period);
        navigation_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let armed = !self.latch.is_set();
            let deadline = self.deadline;
            let recheck_at = self.recheck_at;

            let step = tokio::select! {
                Some(event) = self.host_events.recv() => Step::Host(event),
                command = self.commands.recv() => Step::Command(command),
                _ = body_poll.tick(), if armed => Step::BodyPoll,
                _ = navigation_poll.tick(), if armed => Step::NavigationPoll,
                () = sleep_until_opt(recheck_at), if armed && recheck_at.is_some() => Step::Recheck,
                () = sleep_until_opt(deadline), if armed && deadline.is_some() => Step::Deadline,
            };

            let keep_running = match step {
                Step::Host(event) => self.handle_host_event(event),
                Step::Command(Some(Command::Reload)) => self.reload().await,
                Step::Command(Some(Command::Shutdown) | None) => false,
                Step::BodyPoll => self.check_body(DetectionPath::BodyPoll).await,
                Step::NavigationPoll => {
                    self.check_navigation().await;
                    true
                }
                Step::Recheck => {
                    self.recheck_at = None;
                    self.check_body(DetectionPath::Navigation).await
                }
                Step::Deadline => {
                    self.deadline = None;
                    info!(
                        "No beach data after {:?}, requesting user verification",
                        self.timing.verification_timeout
                    );
                    self.emit(SessionEvent::NeedsVerification)
                }
            };

            if !keep_running {
                break;
            }
        }

        self.host.close().await;
        debug!("Scrape session stopped");
    }

    fn handle_host_event(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::Message(raw) => match PageMessage::parse(&raw) {
                Ok(PageMessage::Log { message }) => {
                    debug!(target: "badevand::scrape::page", "{}", message);
                    true
                }
                Ok(PageMessage::DataReceived { source, data }) => self.offer(&data, source),
                Err(e) => {
                    debug!("Ignoring unrecognised page message: {}", e);
                    true
                }
            },
            HostEvent::LoadError(description) if is_tls_noise(&description) => {
                warn!("Ignoring TLS warning from embedded browser: {}", description);
                true
            }
            HostEvent::LoadError(description) => {
                warn!("Embedded browser failed to load page: {}", description);
                self.emit(SessionEvent::LoadFailed(description))
            }
            HostEvent::HttpError(status) => {
                // Challenge pages arrive with error statuses and still resolve
                warn!("Embedded browser received HTTP status {}", status);
                true
            }
        }
    }

    /// Gate shared by every detection path
    fn offer(&mut self, text: &str, source: DetectionPath) -> bool {
        if self.latch.is_set() {
            debug!(?source, "Ignoring payload, session already produced data");
            return true;
        }
        let Some(items) = parse_page_payload(text) else {
            debug!(?source, "Candidate body does not look like beach data");
            return true;
        };
        let beaches = decode_beach_list(items);
        if !self.latch.try_set() {
            return true;
        }

        self.deadline = None;
        self.recheck_at = None;
        info!(?source, beaches = beaches.len(), "Embedded browser captured beach data");
        self.emit(SessionEvent::Payload { beaches, source })
    }

    async fn check_body(&mut self, source: DetectionPath) -> bool {
        let url = match self.host.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not read current URL: {}", e);
                return true;
            }
        };
        if !url.contains(&self.endpoint_pattern) {
            return true;
        }
        match self.host.body_text().await {
            Ok(text) => self.offer(&text, source),
            Err(e) => {
                debug!("Could not read page body: {}", e);
                true
            }
        }
    }

    async fn check_navigation(&mut self) {
        let Ok(url) = self.host.current_url().await else {
            return;
        };
        match self.last_url.as_deref() {
            Some(last) if last == url => {}
            Some(_) => {
                debug!(%url, "Embedded browser navigated");
                self.recheck_at = Some(Instant::now() + self.timing.navigation_recheck);
                self.last_url = Some(url);
            }
            None => self.last_url = Some(url),
        }
    }

    async fn reload(&mut self) -> bool {
        self.latch.reset();
        self.deadline = Some(Instant::now() + self.timing.verification_timeout);
        self.recheck_at = None;
        self.last_url = None;
        info!("Reloading embedded browser");

        match self.host.reload().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Embedded browser reload failed: {}", e);
                self.emit(SessionEvent::LoadFailed(e.to_string()))
            }
        }
    }

    fn emit(&self, event: SessionEvent) -> bool {
        if self.events.send(event).is_err() {
            debug!("Session owner is gone, stopping");
            return false;
        }
        true
    }
}
