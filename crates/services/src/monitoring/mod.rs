//! Exam-integrity monitoring: capability taps, camera capture and the
//! session that supervises them.

mod capture;
mod host;
mod reporter;
mod session;
mod simulated;
mod taps;

pub use capture::{CaptureHandle, CaptureScheduler, FailureHook};
pub use host::{
    BrowserHost, CameraStream, CapturedFrame, Disposition, EventSource, HostError, KeyCombo,
    Listener, ListenerId, RawEvent,
};
pub use reporter::{BehaviorReporter, ReportCounts};
pub use session::{MonitoringSession, SessionHandle, StopReason};
pub use simulated::{SimulatedCamera, SimulatedHost};
pub use taps::{BrowserTap, CapabilityTap, EventSink, TapHandle, classify, sources};
