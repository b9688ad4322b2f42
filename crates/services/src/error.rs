//! Shared error types for the services crate.
//!
//! `Display` strings are shown to students and instructors, so they say what
//! failed in plain words. Transport details stay in `source()`.

use thiserror::Error;

use api::ApiError;
use exam_core::model::AttemptStateError;

/// Errors emitted by `AccessGate`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccessError {
    #[error("could not load the exam settings")]
    Settings {
        #[source]
        source: ApiError,
    },
    #[error("could not check the exam password")]
    Verification {
        #[source]
        source: ApiError,
    },
}

/// Errors emitted by `AttemptController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptError {
    /// The backend declined to create the attempt. Fatal: no attempt exists.
    #[error("this quiz cannot be started: {reason}")]
    Unavailable { reason: String },

    #[error("could not start the attempt")]
    StartFailed {
        #[source]
        source: ApiError,
    },

    /// Submission did not reach the backend. Answers are kept and the same
    /// submission can be retried.
    #[error("your answers could not be submitted yet; they are kept and you can retry")]
    SubmitFailed {
        #[source]
        source: ApiError,
    },

    #[error("no attempt has been started")]
    NotStarted,

    #[error(transparent)]
    State(#[from] AttemptStateError),
}

impl AttemptError {
    /// True when the user tried to go back past a question under a no-backtrack policy.
    #[must_use]
    pub fn is_backtrack_blocked(&self) -> bool {
        matches!(
            self,
            AttemptError::State(AttemptStateError::BacktrackBlocked { .. })
        )
    }
}

/// Errors emitted by `ReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error("no proctoring report exists for this attempt")]
    NotFound,
    #[error("could not load the proctoring report")]
    Backend {
        #[source]
        source: ApiError,
    },
}

impl From<ApiError> for ReportError {
    fn from(source: ApiError) -> Self {
        match source {
            ApiError::NotFound => ReportError::NotFound,
            source => ReportError::Backend { source },
        }
    }
}
