use async_trait::async_trait;
use exam_core::model::{
    AnswerRecord, AnswerValue, AntiCheatSettings, AttemptId, MonitoringEvent, ProctoringReport,
    Question, QuestionId, QuizId, Snapshot,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by backend adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The backend understood the request and declined it (quiz closed, no attempts left).
    #[error("request refused: {reason}")]
    Refused { reason: String },

    #[error("not found")]
    NotFound,

    #[error("not authorized")]
    Unauthorized,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Serialization(err.to_string())
        } else {
            ApiError::Connection(err.to_string())
        }
    }
}

/// What the backend hands back when an attempt is allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedAttempt {
    pub attempt_id: AttemptId,
    /// Already in display order; the server applies question/answer shuffling.
    pub questions: Vec<Question>,
    pub remaining_seconds: Option<u32>,
}

/// Final answers of an attempt.
///
/// `key` stays the same across retries of one submission so the backend can
/// recognize duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub key: Uuid,
    pub answers: Vec<AnswerRecord>,
}

impl Submission {
    #[must_use]
    pub fn new(answers: Vec<AnswerRecord>) -> Self {
        Self {
            key: Uuid::new_v4(),
            answers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub score: f64,
}

/// Quiz access checks.
#[async_trait]
pub trait SettingsApi: Send + Sync {
    /// Fetch the anti-cheat settings of a quiz.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport or decoding failures. `Ok(None)` means the
    /// quiz has no anti-cheat configuration.
    async fn get_settings(&self, quiz_id: QuizId) -> Result<Option<AntiCheatSettings>, ApiError>;

    /// Check a quiz password.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the check itself could not be performed.
    async fn verify_password(&self, quiz_id: QuizId, password: &str) -> Result<bool, ApiError>;
}

/// Attempt lifecycle calls.
#[async_trait]
pub trait AttemptApi: Send + Sync {
    /// Allocate a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Refused` when the quiz is closed or no attempts are left.
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ApiError>;

    /// Save one answer. Best effort.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the answer was not stored.
    async fn persist_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
        value: &AnswerValue,
    ) -> Result<(), ApiError>;

    /// Submit the final answers.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the submission was not accepted.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> Result<SubmitReceipt, ApiError>;
}

/// Proctoring signal uploads. Every call is independent and best effort.
#[async_trait]
pub trait BehaviorApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` if the event was not recorded.
    async fn record_behavior(&self, attempt_id: AttemptId, event: &MonitoringEvent) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` if the snapshot was not stored.
    async fn upload_snapshot(&self, attempt_id: AttemptId, snapshot: &Snapshot) -> Result<(), ApiError>;
}

/// Instructor-side read model.
#[async_trait]
pub trait ReportApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown attempts.
    async fn get_proctoring_report(&self, attempt_id: AttemptId) -> Result<ProctoringReport, ApiError>;
}
