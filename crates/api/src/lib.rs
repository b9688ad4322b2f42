#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod http;
pub mod memory;

pub use client::{
    ApiError, AttemptApi, BehaviorApi, ReportApi, SettingsApi, StartedAttempt, SubmitReceipt,
    Submission,
};
pub use config::{ApiConfig, ConfigError};
pub use http::HttpBackend;
pub use memory::{InMemoryBackend, QuizFixture};
