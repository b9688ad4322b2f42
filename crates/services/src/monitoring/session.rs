use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use exam_core::Clock;
use exam_core::model::{AntiCheatSettings, AttemptId, Capability, EventCounters, EventType, MonitoringEvent};
use tokio::runtime::Handle;

use super::capture::{CaptureHandle, CaptureScheduler, FailureHook};
use super::host::{BrowserHost, CameraStream};
use super::reporter::BehaviorReporter;
use super::taps::{BrowserTap, CapabilityTap, EventSink, TapHandle};
use crate::config::MonitoringConfig;

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

/// Why a monitoring session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Submitted,
    Expired,
    /// The camera stream failed for good.
    StreamFailure,
    /// The student left the attempt page.
    Navigation,
    /// Start acquired neither a listener nor a device.
    NothingToMonitor,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::Submitted => "submitted",
            StopReason::Expired => "expired",
            StopReason::StreamFailure => "stream failure",
            StopReason::Navigation => "navigation",
            StopReason::NothingToMonitor => "nothing to monitor",
        };
        f.write_str(label)
    }
}

/// Identity of a started session. Returned again by repeated `start` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: AttemptId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Listeners are attached; fullscreen and camera requests may still be pending.
    Starting,
    Active,
    Stopped(StopReason),
}

//
// ─── SHARED STATE ──────────────────────────────────────────────────────────────
//

struct SessionInner {
    session_id: AttemptId,
    phase: Phase,
    started_at: Option<DateTime<Utc>>,
    counters: EventCounters,
    taps: Vec<(Box<dyn CapabilityTap>, TapHandle)>,
    camera: Option<Arc<dyn CameraStream>>,
    capture: Option<CaptureHandle>,
    fullscreen_held: bool,
    reporter: Option<BehaviorReporter>,
    host: Arc<dyn BrowserHost>,
    clock: Clock,
}

impl SessionInner {
    fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Starting | Phase::Active)
    }

    fn holds_resources(&self) -> bool {
        !self.taps.is_empty() || self.camera.is_some() || self.fullscreen_held
    }

    fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.session_id,
            started_at: self.started_at.unwrap_or_else(|| self.clock.now()),
        }
    }

    /// Count one event and queue it for the backend. Ignored once stopped.
    fn record(&mut self, event_type: EventType) -> bool {
        if !self.is_live() {
            return false;
        }
        let sequence = self.counters.increment(event_type);
        tracing::info!(attempt_id = %self.session_id, event = %event_type, sequence, "suspicious behavior");
        if let Some(reporter) = &self.reporter {
            reporter.report(
                self.session_id,
                MonitoringEvent::new(event_type, self.clock.now(), sequence),
            );
        }
        true
    }

    /// The single teardown routine. Every exit path ends here.
    fn release(&mut self, reason: StopReason) -> bool {
        if !self.is_live() {
            return false;
        }
        self.phase = Phase::Stopped(reason);

        for (tap, handle) in self.taps.drain(..) {
            tap.detach(handle);
        }
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
        if std::mem::take(&mut self.fullscreen_held) {
            self.host.exit_fullscreen();
        }
        self.reporter = None;

        tracing::info!(
            attempt_id = %self.session_id,
            %reason,
            events = self.counters.total(),
            "monitoring stopped"
        );
        true
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.release(StopReason::Navigation);
    }
}

fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Supervisor of the capability taps and camera capture of one attempt.
///
/// A session is active exactly while it holds at least one listener, the
/// camera or fullscreen. `start` and `stop` are idempotent, and a stopped
/// session never restarts. Dropping the session releases everything it holds.
pub struct MonitoringSession {
    inner: Arc<Mutex<SessionInner>>,
    host: Arc<dyn BrowserHost>,
    clock: Clock,
    config: MonitoringConfig,
}

impl MonitoringSession {
    #[must_use]
    pub fn new(session_id: AttemptId, host: Arc<dyn BrowserHost>, clock: Clock, config: MonitoringConfig) -> Self {
        let inner = SessionInner {
            session_id,
            phase: Phase::Idle,
            started_at: None,
            counters: EventCounters::new(),
            taps: Vec::new(),
            camera: None,
            capture: None,
            fullscreen_held: false,
            reporter: None,
            host: Arc::clone(&host),
            clock,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            host,
            clock,
            config,
        }
    }

    /// Attach one tap per enabled capability, then request fullscreen and
    /// the camera as the settings ask.
    ///
    /// Calling it again returns the existing handle without acquiring anything.
    /// Fullscreen or camera refusals are logged and never abort the session;
    /// a camera refusal is recorded as one `webcam_denied` event.
    pub async fn start(&self, settings: &AntiCheatSettings, reporter: BehaviorReporter) -> SessionHandle {
        {
            let mut inner = lock(&self.inner);
            if inner.phase != Phase::Idle {
                return inner.handle();
            }
            inner.phase = Phase::Starting;
            inner.started_at = Some(self.clock.now());
            inner.reporter = Some(reporter.clone());

            for capability in settings.capabilities() {
                let tap: Box<dyn CapabilityTap> = Box::new(BrowserTap::new(
                    capability,
                    Arc::clone(&self.host),
                    settings.suppresses(capability),
                ));
                match tap.attach(self.sink()) {
                    Ok(handle) => inner.taps.push((tap, handle)),
                    Err(err) => {
                        tracing::warn!(attempt_id = %inner.session_id, %capability, error = %err, "capability tap unavailable");
                    }
                }
            }
            tracing::info!(attempt_id = %inner.session_id, taps = inner.taps.len(), "monitoring starting");
        }

        if settings.requests_fullscreen() {
            self.enter_fullscreen().await;
        }
        if settings.requests_camera() {
            self.open_camera(reporter).await;
        }

        let mut inner = lock(&self.inner);
        if inner.phase == Phase::Starting {
            if inner.holds_resources() {
                inner.phase = Phase::Active;
            } else {
                inner.release(StopReason::NothingToMonitor);
            }
        }
        inner.handle()
    }

    async fn enter_fullscreen(&self) {
        match self.host.request_fullscreen().await {
            Ok(()) => {
                let kept = {
                    let mut inner = lock(&self.inner);
                    if inner.is_live() {
                        inner.fullscreen_held = true;
                    }
                    inner.is_live()
                };
                if !kept {
                    self.host.exit_fullscreen();
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "fullscreen refused; continuing without it");
            }
        }
    }

    async fn open_camera(&self, reporter: BehaviorReporter) {
        match self.host.open_camera().await {
            Ok(stream) => {
                let mut inner = lock(&self.inner);
                if !inner.is_live() {
                    // Stopped while the permission prompt was open.
                    stream.stop();
                    return;
                }
                let scheduler = CaptureScheduler::new(self.config.capture_period, self.clock);
                let capture = scheduler.start(
                    inner.session_id,
                    Arc::clone(&stream),
                    reporter,
                    self.failure_hook(),
                );
                inner.camera = Some(stream);
                inner.capture = Some(capture);
            }
            Err(err) => {
                let mut inner = lock(&self.inner);
                tracing::warn!(attempt_id = %inner.session_id, error = %err, "camera unavailable; continuing without capture");
                inner.record(EventType::WebcamDenied);
            }
        }
    }

    fn sink(&self) -> EventSink {
        let weak = Arc::downgrade(&self.inner);
        let host = Arc::clone(&self.host);
        let retry_delay = self.config.fullscreen_retry_delay;
        Arc::new(move |event_type| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let recorded = {
                let mut inner = lock(&inner);
                let recorded = inner.record(event_type);
                if recorded && event_type == EventType::FullscreenExit {
                    // The browser already left fullscreen; only a retry gets it back.
                    inner.fullscreen_held = false;
                }
                recorded
            };
            if recorded && event_type == EventType::FullscreenExit {
                schedule_fullscreen_retry(Weak::clone(&weak), Arc::clone(&host), retry_delay);
            }
        })
    }

    fn failure_hook(&self) -> FailureHook {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).release(StopReason::StreamFailure);
            }
        })
    }

    /// Release every listener and device. Returns false if the session was
    /// not running, in which case nothing happens.
    pub fn stop(&self, reason: StopReason) -> bool {
        lock(&self.inner).release(reason)
    }

    #[must_use]
    pub fn session_id(&self) -> AttemptId {
        lock(&self.inner).session_id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.inner).phase == Phase::Active
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner).started_at
    }

    /// Set once the session has stopped.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        match lock(&self.inner).phase {
            Phase::Stopped(reason) => Some(reason),
            _ => None,
        }
    }

    #[must_use]
    pub fn counters(&self) -> EventCounters {
        lock(&self.inner).counters.clone()
    }

    #[must_use]
    pub fn active_taps(&self) -> Vec<Capability> {
        lock(&self.inner)
            .taps
            .iter()
            .map(|(_, handle)| handle.capability())
            .collect()
    }

    #[must_use]
    pub fn holds_camera(&self) -> bool {
        lock(&self.inner).camera.is_some()
    }

    #[must_use]
    pub fn holds_fullscreen(&self) -> bool {
        lock(&self.inner).fullscreen_held
    }
}

impl fmt::Debug for MonitoringSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("MonitoringSession")
            .field("session_id", &inner.session_id)
            .field("phase", &inner.phase)
            .field("counters", &inner.counters)
            .field("taps", &inner.taps.len())
            .field("camera", &inner.camera.is_some())
            .finish_non_exhaustive()
    }
}

/// Ask for fullscreen again after `delay`, unless the session stopped meanwhile.
fn schedule_fullscreen_retry(weak: Weak<Mutex<SessionInner>>, host: Arc<dyn BrowserHost>, delay: Duration) {
    let Ok(runtime) = Handle::try_current() else {
        tracing::warn!("no runtime to retry fullscreen on");
        return;
    };
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        let still_live = weak.upgrade().is_some_and(|inner| lock(&inner).is_live());
        if !still_live {
            return;
        }
        if let Err(err) = host.request_fullscreen().await {
            tracing::debug!(error = %err, "fullscreen retry refused");
            return;
        }
        let kept = weak.upgrade().is_some_and(|inner| {
            let mut inner = lock(&inner);
            if inner.is_live() {
                inner.fullscreen_held = true;
            }
            inner.is_live()
        });
        if !kept {
            host.exit_fullscreen();
        }
    });
}
