//! In-process browser host for tests and the terminal runner.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::host::{
    BrowserHost, CameraStream, CapturedFrame, Disposition, EventSource, HostError, Listener,
    ListenerId, RawEvent,
};

#[derive(Default)]
struct HostState {
    next_listener: u64,
    listeners: BTreeMap<ListenerId, (EventSource, Listener)>,
    fullscreen: bool,
    fullscreen_denied: bool,
    fullscreen_requests: u32,
    camera_denied: bool,
    camera_grant_delay: Duration,
    capture_delay: Duration,
    cameras: Vec<Arc<SimulatedCamera>>,
}

/// Scriptable `BrowserHost`: events are injected with `dispatch`, permissions
/// are decided up front with the `with_*` builders.
#[derive(Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_camera_denied(self) -> Self {
        self.lock().camera_denied = true;
        self
    }

    /// Delay between the camera request and the grant.
    #[must_use]
    pub fn with_camera_grant_delay(self, delay: Duration) -> Self {
        self.lock().camera_grant_delay = delay;
        self
    }

    #[must_use]
    pub fn with_fullscreen_denied(self) -> Self {
        self.lock().fullscreen_denied = true;
        self
    }

    /// Time each frame capture takes.
    #[must_use]
    pub fn with_capture_delay(self, delay: Duration) -> Self {
        self.lock().capture_delay = delay;
        self
    }

    /// Deliver `event` to every listener registered for its source.
    ///
    /// Returns `PreventDefault` if any listener cancelled the default action.
    pub fn dispatch(&self, event: &RawEvent) -> Disposition {
        let source = event.source();
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .values()
            .filter(|(s, _)| *s == source)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut disposition = Disposition::Allow;
        for listener in listeners {
            if listener(event) == Disposition::PreventDefault {
                disposition = Disposition::PreventDefault;
            }
        }
        disposition
    }

    /// The student leaves fullscreen (Esc or window switch).
    pub fn simulate_fullscreen_exit(&self) -> Disposition {
        self.lock().fullscreen = false;
        self.dispatch(&RawEvent::FullscreenChange { active: false })
    }

    /// Refuse or allow later fullscreen requests.
    pub fn set_fullscreen_denied(&self, denied: bool) {
        self.lock().fullscreen_denied = denied;
    }

    /// End every camera stream handed out so far, as if the device was unplugged.
    pub fn fail_camera_stream(&self) {
        for camera in &self.lock().cameras {
            camera.fail();
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    #[must_use]
    pub fn listener_count_for(&self, source: EventSource) -> usize {
        self.lock()
            .listeners
            .values()
            .filter(|(s, _)| *s == source)
            .count()
    }

    #[must_use]
    pub fn fullscreen_requests(&self) -> u32 {
        self.lock().fullscreen_requests
    }

    /// Number of camera streams opened.
    #[must_use]
    pub fn cameras_opened(&self) -> usize {
        self.lock().cameras.len()
    }

    /// Live tracks across every camera stream handed out.
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.lock().cameras.iter().map(|c| c.live_tracks()).sum()
    }

    /// Frames captured across every camera stream.
    #[must_use]
    pub fn frames_captured(&self) -> u32 {
        self.lock().cameras.iter().map(|c| c.frames()).sum()
    }
}

#[async_trait]
impl BrowserHost for SimulatedHost {
    fn add_listener(&self, source: EventSource, listener: Listener) -> Result<ListenerId, HostError> {
        let mut state = self.lock();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.insert(id, (source, listener));
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(&id).is_some()
    }

    async fn request_fullscreen(&self) -> Result<(), HostError> {
        let mut state = self.lock();
        state.fullscreen_requests += 1;
        if state.fullscreen_denied {
            return Err(HostError::PermissionDenied("fullscreen"));
        }
        state.fullscreen = true;
        Ok(())
    }

    fn exit_fullscreen(&self) -> bool {
        std::mem::take(&mut self.lock().fullscreen)
    }

    fn is_fullscreen(&self) -> bool {
        self.lock().fullscreen
    }

    async fn open_camera(&self) -> Result<Arc<dyn CameraStream>, HostError> {
        let (denied, delay, capture_delay) = {
            let state = self.lock();
            (state.camera_denied, state.camera_grant_delay, state.capture_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if denied {
            return Err(HostError::PermissionDenied("camera"));
        }
        let camera = Arc::new(SimulatedCamera::new(capture_delay));
        self.lock().cameras.push(Arc::clone(&camera));
        Ok(camera)
    }
}

/// One-track camera stream that yields tiny fake JPEG frames.
#[derive(Debug)]
pub struct SimulatedCamera {
    live_tracks: AtomicUsize,
    failed: AtomicBool,
    frames: AtomicU32,
    capture_delay: Duration,
}

impl SimulatedCamera {
    #[must_use]
    pub fn new(capture_delay: Duration) -> Self {
        Self {
            live_tracks: AtomicUsize::new(1),
            failed: AtomicBool::new(false),
            frames: AtomicU32::new(0),
            capture_delay,
        }
    }

    /// Make every later read fail with `StreamEnded`. Tracks stay allocated
    /// until `stop` is called.
    pub fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn frames(&self) -> u32 {
        self.frames.load(Ordering::SeqCst)
    }

    fn ended(&self) -> bool {
        self.failed.load(Ordering::SeqCst) || self.live_tracks.load(Ordering::SeqCst) == 0
    }
}

#[async_trait]
impl CameraStream for SimulatedCamera {
    async fn ready(&self) -> Result<(), HostError> {
        if self.ended() {
            return Err(HostError::StreamEnded);
        }
        Ok(())
    }

    async fn capture_frame(&self) -> Result<CapturedFrame, HostError> {
        if self.ended() {
            return Err(HostError::StreamEnded);
        }
        if !self.capture_delay.is_zero() {
            tokio::time::sleep(self.capture_delay).await;
        }
        let n = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CapturedFrame {
            mime_type: "image/jpeg".to_string(),
            bytes: [&[0xFF, 0xD8, 0xFF][..], &n.to_be_bytes()[..]].concat(),
        })
    }

    fn stop(&self) {
        self.live_tracks.store(0, Ordering::SeqCst);
    }

    fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }
}
