use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use exam_core::model::{
    AnswerValue, AntiCheatSettings, AttemptId, EventCounters, MonitoringEvent, ProctoringReport,
    Question, QuestionId, QuizId, ScreenshotRef, Snapshot,
};
use exam_core::risk::RiskScorer;

use crate::client::{
    ApiError, AttemptApi, BehaviorApi, ReportApi, SettingsApi, StartedAttempt, SubmitReceipt,
    Submission,
};

/// A quiz the in-memory backend can hand out attempts for.
#[derive(Debug, Clone)]
pub struct QuizFixture {
    pub questions: Vec<Question>,
    pub time_limit_secs: Option<u32>,
    pub open: bool,
    pub max_attempts: Option<u32>,
    pub settings: Option<AntiCheatSettings>,
    pub password: Option<String>,
}

impl QuizFixture {
    #[must_use]
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            time_limit_secs: None,
            open: true,
            max_attempts: None,
            settings: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: AntiCheatSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    #[must_use]
    pub fn closed(mut self) -> Self {
        self.open = false;
        self
    }
}

#[derive(Debug, Default)]
struct AttemptRecord {
    quiz_id: Option<QuizId>,
    answers: BTreeMap<QuestionId, AnswerValue>,
    submission_calls: Vec<Submission>,
    accepted: Option<Submission>,
    events: Vec<MonitoringEvent>,
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    submit: u32,
    persist: u32,
    behavior: bool,
    snapshot: bool,
    settings: bool,
}

#[derive(Debug, Default)]
struct BackendState {
    quizzes: HashMap<QuizId, QuizFixture>,
    attempts: BTreeMap<AttemptId, AttemptRecord>,
    started_per_quiz: HashMap<QuizId, u32>,
    next_attempt_id: u64,
    password_checks: u32,
    failures: FailurePlan,
}

/// In-process stand-in for the exam backend, used by tests and demos.
///
/// Records every call so tests can inspect exactly what reached the "server",
/// and can be told to fail specific operations.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
    scorer: RiskScorer,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BackendState>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::Connection(e.to_string()))
    }

    fn lock_unpoisoned(&self) -> MutexGuard<'_, BackendState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add_quiz(&self, quiz_id: QuizId, fixture: QuizFixture) {
        self.lock_unpoisoned().quizzes.insert(quiz_id, fixture);
    }

    /// Fail the next `n` calls to `submit_attempt`.
    pub fn fail_next_submits(&self, n: u32) {
        self.lock_unpoisoned().failures.submit = n;
    }

    /// Fail the next `n` calls to `persist_answer`.
    pub fn fail_next_persists(&self, n: u32) {
        self.lock_unpoisoned().failures.persist = n;
    }

    pub fn set_behavior_failing(&self, failing: bool) {
        self.lock_unpoisoned().failures.behavior = failing;
    }

    pub fn set_snapshots_failing(&self, failing: bool) {
        self.lock_unpoisoned().failures.snapshot = failing;
    }

    pub fn set_settings_failing(&self, failing: bool) {
        self.lock_unpoisoned().failures.settings = failing;
    }

    #[must_use]
    pub fn password_checks(&self) -> u32 {
        self.lock_unpoisoned().password_checks
    }

    #[must_use]
    pub fn attempts_started(&self) -> usize {
        self.lock_unpoisoned().attempts.len()
    }

    #[must_use]
    pub fn recorded_events(&self, attempt_id: AttemptId) -> Vec<MonitoringEvent> {
        self.lock_unpoisoned()
            .attempts
            .get(&attempt_id)
            .map(|a| a.events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn snapshots(&self, attempt_id: AttemptId) -> Vec<Snapshot> {
        self.lock_unpoisoned()
            .attempts
            .get(&attempt_id)
            .map(|a| a.snapshots.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn persisted_answers(&self, attempt_id: AttemptId) -> BTreeMap<QuestionId, AnswerValue> {
        self.lock_unpoisoned()
            .attempts
            .get(&attempt_id)
            .map(|a| a.answers.clone())
            .unwrap_or_default()
    }

    /// Every submission the backend received for an attempt, failed ones included.
    #[must_use]
    pub fn submission_calls(&self, attempt_id: AttemptId) -> Vec<Submission> {
        self.lock_unpoisoned()
            .attempts
            .get(&attempt_id)
            .map(|a| a.submission_calls.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn accepted_submission(&self, attempt_id: AttemptId) -> Option<Submission> {
        self.lock_unpoisoned()
            .attempts
            .get(&attempt_id)
            .and_then(|a| a.accepted.clone())
    }
}

fn take_failure(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl SettingsApi for InMemoryBackend {
    async fn get_settings(&self, quiz_id: QuizId) -> Result<Option<AntiCheatSettings>, ApiError> {
        let guard = self.lock()?;
        if guard.failures.settings {
            return Err(ApiError::Connection("settings unavailable".into()));
        }
        let quiz = guard.quizzes.get(&quiz_id).ok_or(ApiError::NotFound)?;
        Ok(quiz.settings.clone())
    }

    async fn verify_password(&self, quiz_id: QuizId, password: &str) -> Result<bool, ApiError> {
        let mut guard = self.lock()?;
        guard.password_checks += 1;
        let quiz = guard.quizzes.get(&quiz_id).ok_or(ApiError::NotFound)?;
        Ok(quiz.password.as_deref() == Some(password))
    }
}

#[async_trait]
impl AttemptApi for InMemoryBackend {
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ApiError> {
        let mut guard = self.lock()?;
        let quiz = guard.quizzes.get(&quiz_id).cloned().ok_or(ApiError::NotFound)?;
        if !quiz.open {
            return Err(ApiError::Refused {
                reason: "quiz is closed".into(),
            });
        }
        let used = guard.started_per_quiz.get(&quiz_id).copied().unwrap_or(0);
        if quiz.max_attempts.is_some_and(|max| used >= max) {
            return Err(ApiError::Refused {
                reason: "maximum attempts reached".into(),
            });
        }

        guard.next_attempt_id += 1;
        let attempt_id = AttemptId::new(guard.next_attempt_id);
        guard.started_per_quiz.insert(quiz_id, used + 1);
        guard.attempts.insert(
            attempt_id,
            AttemptRecord {
                quiz_id: Some(quiz_id),
                ..AttemptRecord::default()
            },
        );

        Ok(StartedAttempt {
            attempt_id,
            questions: quiz.questions,
            remaining_seconds: quiz.time_limit_secs,
        })
    }

    async fn persist_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
        value: &AnswerValue,
    ) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        if take_failure(&mut guard.failures.persist) {
            return Err(ApiError::Connection("answer not saved".into()));
        }
        let attempt = guard.attempts.get_mut(&attempt_id).ok_or(ApiError::NotFound)?;
        attempt.answers.insert(question_id, value.clone());
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> Result<SubmitReceipt, ApiError> {
        let mut guard = self.lock()?;
        let fail = take_failure(&mut guard.failures.submit);
        let quiz_id = {
            let attempt = guard.attempts.get_mut(&attempt_id).ok_or(ApiError::NotFound)?;
            attempt.submission_calls.push(submission.clone());
            if fail {
                return Err(ApiError::Connection("submission timed out".into()));
            }
            match &attempt.accepted {
                Some(existing) if existing.key != submission.key => {
                    return Err(ApiError::Refused {
                        reason: "attempt already submitted".into(),
                    });
                }
                Some(_) => {}
                None => attempt.accepted = Some(submission.clone()),
            }
            attempt.quiz_id
        };

        let total = quiz_id
            .and_then(|id| guard.quizzes.get(&id))
            .map_or(0, |quiz| quiz.questions.len());
        #[allow(clippy::cast_precision_loss)]
        let score = if total == 0 {
            0.0
        } else {
            submission.answers.len() as f64 / total as f64 * 100.0
        };
        Ok(SubmitReceipt { score })
    }
}

#[async_trait]
impl BehaviorApi for InMemoryBackend {
    async fn record_behavior(&self, attempt_id: AttemptId, event: &MonitoringEvent) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        if guard.failures.behavior {
            return Err(ApiError::Connection("behavior endpoint unreachable".into()));
        }
        let attempt = guard.attempts.entry(attempt_id).or_default();
        attempt.events.push(event.clone());
        Ok(())
    }

    async fn upload_snapshot(&self, attempt_id: AttemptId, snapshot: &Snapshot) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        if guard.failures.snapshot {
            return Err(ApiError::Connection("snapshot upload failed".into()));
        }
        let attempt = guard.attempts.entry(attempt_id).or_default();
        attempt.snapshots.push(snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl ReportApi for InMemoryBackend {
    async fn get_proctoring_report(&self, attempt_id: AttemptId) -> Result<ProctoringReport, ApiError> {
        let guard = self.lock()?;
        let attempt = guard.attempts.get(&attempt_id).ok_or(ApiError::NotFound)?;

        let mut counts = EventCounters::new();
        for event in &attempt.events {
            counts.increment(event.event_type());
        }
        let assessment = self.scorer.assess(&counts);
        let screenshots = attempt
            .snapshots
            .iter()
            .enumerate()
            .map(|(i, snap)| ScreenshotRef {
                captured_at: snap.captured_at,
                url: format!("memory://attempts/{attempt_id}/snapshots/{i}"),
            })
            .collect();

        Ok(ProctoringReport {
            risk_level: assessment.risk_level,
            suspicious_score: assessment.suspicious_score,
            per_category_counts: counts,
            screenshots,
            events: attempt.events.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{EventType, QuestionKind, RiskLevel};
    use exam_core::time::fixed_now;

    fn fixture() -> QuizFixture {
        let q = Question::new(QuestionId::new(1), "Q1", QuestionKind::ShortAnswer, Vec::new()).unwrap();
        QuizFixture::new(vec![q])
    }

    #[tokio::test]
    async fn closed_quiz_refuses_attempts() {
        let backend = InMemoryBackend::new();
        backend.add_quiz(QuizId::new(1), fixture().closed());
        let err = backend.start_attempt(QuizId::new(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::Refused { .. }));
        assert_eq!(backend.attempts_started(), 0);
    }

    #[tokio::test]
    async fn max_attempts_enforced() {
        let backend = InMemoryBackend::new();
        backend.add_quiz(QuizId::new(1), fixture().with_max_attempts(1));
        backend.start_attempt(QuizId::new(1)).await.unwrap();
        let err = backend.start_attempt(QuizId::new(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::Refused { reason } if reason.contains("maximum")));
    }

    #[tokio::test]
    async fn resubmitting_with_same_key_is_accepted() {
        let backend = InMemoryBackend::new();
        backend.add_quiz(QuizId::new(1), fixture());
        let started = backend.start_attempt(QuizId::new(1)).await.unwrap();
        let submission = Submission::new(Vec::new());

        backend.submit_attempt(started.attempt_id, &submission).await.unwrap();
        backend.submit_attempt(started.attempt_id, &submission).await.unwrap();
        let other = Submission::new(Vec::new());
        assert!(backend.submit_attempt(started.attempt_id, &other).await.is_err());
        assert_eq!(backend.submission_calls(started.attempt_id).len(), 3);
    }

    #[tokio::test]
    async fn report_scores_recorded_events() {
        let backend = InMemoryBackend::new();
        let attempt_id = AttemptId::new(5);
        for seq in 1..=4 {
            backend
                .record_behavior(attempt_id, &MonitoringEvent::new(EventType::TabSwitch, fixed_now(), seq))
                .await
                .unwrap();
        }
        let report = backend.get_proctoring_report(attempt_id).await.unwrap();
        assert_eq!(report.per_category_counts.get(EventType::TabSwitch), 4);
        assert_eq!(report.risk_level, RiskLevel::Medium);
        assert_eq!(report.events.len(), 4);
    }
}
