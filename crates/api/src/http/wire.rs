//! JSON payloads exchanged with the REST backend and their domain mappings.

use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerValue, AttemptId, EventCounters, EventType, MonitoringEvent, ProctoringReport, Question,
    QuestionId, QuestionKind, RiskLevel, ScreenshotRef,
};
use serde::{Deserialize, Serialize};

use crate::client::{ApiError, StartedAttempt};

#[derive(Debug, Serialize)]
pub(crate) struct VerifyPasswordRequest<'a> {
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyPasswordResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PersistAnswerRequest<'a> {
    pub value: &'a AnswerValue,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionDto {
    pub id: u64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartAttemptResponse {
    pub attempt_id: u64,
    pub questions: Vec<QuestionDto>,
    pub remaining_seconds: Option<u32>,
}

impl StartAttemptResponse {
    pub(crate) fn into_domain(self) -> Result<StartedAttempt, ApiError> {
        let questions = self
            .questions
            .into_iter()
            .map(|dto| {
                Question::new(QuestionId::new(dto.id), dto.text, dto.kind, dto.options)
                    .map_err(|e| ApiError::Serialization(format!("question {}: {e}", dto.id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StartedAttempt {
            attempt_id: AttemptId::new(self.attempt_id),
            questions,
            remaining_seconds: self.remaining_seconds,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScreenshotDto {
    pub captured_at: DateTime<Utc>,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportResponse {
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub suspicious_score: f64,
    #[serde(default)]
    pub per_category_counts: std::collections::BTreeMap<String, u32>,
    #[serde(default)]
    pub screenshots: Vec<ScreenshotDto>,
    #[serde(default)]
    pub events: Vec<MonitoringEvent>,
}

impl ReportResponse {
    /// Unknown categories are skipped so an older client can still render newer reports.
    pub(crate) fn into_domain(self) -> ProctoringReport {
        let counts = self.per_category_counts.into_iter().filter_map(|(raw, n)| {
            match raw.parse::<EventType>() {
                Ok(event_type) => Some((event_type, n)),
                Err(err) => {
                    tracing::debug!(%err, "skipping report category");
                    None
                }
            }
        });

        ProctoringReport {
            risk_level: self.risk_level,
            suspicious_score: self.suspicious_score,
            per_category_counts: EventCounters::from_counts(counts),
            screenshots: self
                .screenshots
                .into_iter()
                .map(|s| ScreenshotRef {
                    captured_at: s.captured_at,
                    url: s.url,
                })
                .collect(),
            events: self.events,
        }
    }
}
