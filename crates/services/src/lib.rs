#![forbid(unsafe_code)]

pub mod access_gate;
pub mod attempt;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod report_service;

pub use exam_core::Clock;

pub use access_gate::{AccessDecision, AccessGate, PasswordPrompter};
pub use attempt::{AttemptController, Tick};
pub use config::MonitoringConfig;
pub use error::{AccessError, AttemptError, ReportError};
pub use monitoring::{
    BehaviorReporter, BrowserHost, CameraStream, CaptureScheduler, MonitoringSession,
    SessionHandle, SimulatedHost, StopReason,
};
pub use report_service::{ReportService, ReportView};
