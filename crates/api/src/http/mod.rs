mod wire;

use async_trait::async_trait;
use exam_core::model::{
    AnswerValue, AntiCheatSettings, AttemptId, MonitoringEvent, ProctoringReport, QuestionId,
    QuizId, Snapshot,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::{
    ApiError, AttemptApi, BehaviorApi, ReportApi, SettingsApi, StartedAttempt, SubmitReceipt,
    Submission,
};
use crate::config::ApiConfig;
use wire::{
    ErrorBody, PersistAnswerRequest, ReportResponse, StartAttemptResponse, VerifyPasswordRequest,
    VerifyPasswordResponse,
};

/// Header carrying the capture time of an uploaded snapshot.
pub const CAPTURED_AT_HEADER: &str = "x-captured-at";

/// REST client for the exam backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: ApiConfig,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns `ApiError::Connection` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ApiError::Serialization(format!("bad path {path}: {e}")))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(error_for(status, response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn error_for(status: StatusCode, response: Response) -> ApiError {
    let body = if is_refusal(status) {
        response.json::<ErrorBody>().await.ok()
    } else {
        None
    };
    classify(status, body)
}

/// Statuses meaning the backend understood the request and declined it.
fn is_refusal(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN
            | StatusCode::CONFLICT
            | StatusCode::GONE
            | StatusCode::UNPROCESSABLE_ENTITY
            | StatusCode::LOCKED
    )
}

/// Map a non-success status, and the error body if one was read, to an `ApiError`.
fn classify(status: StatusCode, body: Option<ErrorBody>) -> ApiError {
    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        refused if is_refusal(refused) => {
            let reason = match body {
                Some(body) => body.error,
                None => refused
                    .canonical_reason()
                    .unwrap_or("request refused")
                    .to_string(),
            };
            ApiError::Refused { reason }
        }
        other => ApiError::Status(other.as_u16()),
    }
}

/// A quiz without anti-cheat settings answers 404; that means monitoring is off.
fn settings_or_disabled(
    result: Result<AntiCheatSettings, ApiError>,
) -> Result<Option<AntiCheatSettings>, ApiError> {
    match result {
        Ok(settings) => Ok(Some(settings)),
        Err(ApiError::NotFound) => Ok(None),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl SettingsApi for HttpBackend {
    async fn get_settings(&self, quiz_id: QuizId) -> Result<Option<AntiCheatSettings>, ApiError> {
        let url = self.url(&format!("quizzes/{quiz_id}/anti-cheat"))?;
        settings_or_disabled(self.send_json::<AntiCheatSettings>(self.client.get(url)).await)
    }

    async fn verify_password(&self, quiz_id: QuizId, password: &str) -> Result<bool, ApiError> {
        let url = self.url(&format!("quizzes/{quiz_id}/verify-password"))?;
        let body: VerifyPasswordResponse = self
            .send_json(self.client.post(url).json(&VerifyPasswordRequest { password }))
            .await?;
        Ok(body.valid)
    }
}

#[async_trait]
impl AttemptApi for HttpBackend {
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ApiError> {
        let url = self.url(&format!("quizzes/{quiz_id}/attempts"))?;
        let body: StartAttemptResponse = self.send_json(self.client.post(url)).await?;
        body.into_domain()
    }

    async fn persist_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
        value: &AnswerValue,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("attempts/{attempt_id}/answers/{question_id}"))?;
        self.send(self.client.put(url).json(&PersistAnswerRequest { value }))
            .await?;
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> Result<SubmitReceipt, ApiError> {
        let url = self.url(&format!("attempts/{attempt_id}/submit"))?;
        self.send_json(self.client.post(url).json(submission)).await
    }
}

#[async_trait]
impl BehaviorApi for HttpBackend {
    async fn record_behavior(&self, attempt_id: AttemptId, event: &MonitoringEvent) -> Result<(), ApiError> {
        let url = self.url(&format!("attempts/{attempt_id}/behavior"))?;
        self.send(self.client.post(url).json(event)).await?;
        Ok(())
    }

    async fn upload_snapshot(&self, attempt_id: AttemptId, snapshot: &Snapshot) -> Result<(), ApiError> {
        let url = self.url(&format!("attempts/{attempt_id}/snapshots"))?;
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, snapshot.mime_type.as_str())
            .header(CAPTURED_AT_HEADER, snapshot.captured_at.to_rfc3339())
            .body(snapshot.bytes.clone());
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportApi for HttpBackend {
    async fn get_proctoring_report(&self, attempt_id: AttemptId) -> Result<ProctoringReport, ApiError> {
        let url = self.url(&format!("attempts/{attempt_id}/proctoring-report"))?;
        let body: ReportResponse = self.send_json(self.client.get(url)).await?;
        Ok(body.into_domain())
    }
}
