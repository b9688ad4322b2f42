use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use api::{
    ApiError, AttemptApi, InMemoryBackend, QuizFixture, StartedAttempt, SubmitReceipt, Submission,
};
use exam_core::model::{
    AnswerValue, AntiCheatSettings, AttemptId, AttemptStatus, EventType, Question, QuestionId,
    QuestionKind, QuizId,
};
use exam_core::time::fixed_clock;
use services::monitoring::RawEvent;
use services::BrowserHost;
use services::{
    AccessGate, AttemptController, AttemptError, MonitoringConfig, PasswordPrompter,
    SimulatedHost, StopReason, Tick,
};

const QUIZ: QuizId = QuizId::new(1);
const FIRST_ATTEMPT: AttemptId = AttemptId::new(1);

fn questions(n: u64) -> Vec<Question> {
    (1..=n)
        .map(|id| {
            Question::new(
                QuestionId::new(id),
                format!("Question {id}"),
                QuestionKind::ShortAnswer,
                Vec::new(),
            )
            .unwrap()
        })
        .collect()
}

fn controller(backend: &InMemoryBackend, host: &SimulatedHost) -> AttemptController {
    AttemptController::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(host.clone()),
        fixed_clock(),
        MonitoringConfig::default().with_fullscreen_retry_delay(Duration::from_millis(100)),
    )
}

fn text(answer: &str) -> AnswerValue {
    AnswerValue::Text(answer.to_string())
}

#[tokio::test]
async fn unmonitored_attempt_completes_without_events() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(2)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);

    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();
    assert!(attempt.monitoring().is_none());
    assert_eq!(host.listener_count(), 0);

    attempt.answer(0, text("A")).unwrap();
    let receipt = attempt.submit().await.unwrap();
    attempt.flush_answers().await;

    assert_eq!(attempt.status(), AttemptStatus::Completed);
    assert!((receipt.score - 50.0).abs() < f64::EPSILON);
    assert!(backend.recorded_events(FIRST_ATTEMPT).is_empty());
    assert_eq!(
        backend.persisted_answers(FIRST_ATTEMPT).get(&QuestionId::new(1)),
        Some(&text("A"))
    );
}

#[tokio::test]
async fn monitored_attempt_freezes_counters_on_submit() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    let settings = AntiCheatSettings {
        enabled: true,
        monitor_focus_loss: true,
        block_copy_paste: true,
        ..AntiCheatSettings::default()
    };

    attempt.start(QUIZ, settings).await.unwrap();
    let monitoring = attempt.monitoring().unwrap();
    assert_eq!(monitoring.active_taps().len(), 2);

    host.dispatch(&RawEvent::Blur);
    host.dispatch(&RawEvent::Copy);

    attempt.submit().await.unwrap();
    let monitoring = attempt.monitoring().unwrap();
    assert_eq!(monitoring.stop_reason(), Some(StopReason::Submitted));
    assert!(monitoring.active_taps().is_empty());
    assert_eq!(host.listener_count(), 0);

    host.dispatch(&RawEvent::Blur);
    let counters = monitoring.counters();
    assert_eq!(counters.get(EventType::FocusLoss), 1);
    assert_eq!(counters.get(EventType::CopyAttempt), 1);
    assert_eq!(counters.total(), 2);

    attempt.reporter().unwrap().flush().await;
    assert_eq!(backend.recorded_events(FIRST_ATTEMPT).len(), 2);
}

#[tokio::test]
async fn backtracking_is_blocked_past_highest_visited() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(4)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    let settings = AntiCheatSettings {
        enabled: true,
        prevent_backtrack: true,
        ..AntiCheatSettings::default()
    };
    attempt.start(QUIZ, settings).await.unwrap();

    attempt.navigate(1).unwrap();
    attempt.navigate(2).unwrap();

    let err = attempt.navigate(1).unwrap_err();
    assert!(err.is_backtrack_blocked());
    assert_eq!(attempt.progress().unwrap().current_index, 2);
    assert_eq!(attempt.navigate(3).unwrap(), 3);
}

#[tokio::test]
async fn backtracking_is_free_without_the_flag() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(3)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();

    attempt.navigate(2).unwrap();
    assert_eq!(attempt.navigate(0).unwrap(), 0);
}

#[tokio::test]
async fn failed_submission_is_retried_with_the_same_answers() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(3)));
    backend.fail_next_submits(1);
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();

    attempt.answer(0, text("first")).unwrap();
    attempt.answer(2, text("third")).unwrap();

    let err = attempt.submit().await.unwrap_err();
    assert!(matches!(err, AttemptError::SubmitFailed { .. }));
    assert_eq!(attempt.status(), AttemptStatus::Submitting);
    let frozen = attempt.pending_submission().cloned().unwrap();

    assert!(attempt.answer(1, text("late")).is_err());
    assert!(attempt.navigate(1).is_err());

    attempt.submit().await.unwrap();
    assert_eq!(attempt.status(), AttemptStatus::Completed);

    let calls = backend.submission_calls(FIRST_ATTEMPT);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
    let accepted = backend.accepted_submission(FIRST_ATTEMPT).unwrap();
    assert_eq!(accepted, frozen);
    let ids: Vec<QuestionId> = accepted.answers.iter().map(|a| a.question_id).collect();
    assert_eq!(ids, vec![QuestionId::new(1), QuestionId::new(3)]);

    // Completed attempts hand back the receipt without another call.
    attempt.submit().await.unwrap();
    assert_eq!(backend.submission_calls(FIRST_ATTEMPT).len(), 2);
}

#[tokio::test]
async fn persistence_failures_keep_the_local_answer() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)));
    backend.fail_next_persists(1);
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();

    attempt.answer(0, text("kept")).unwrap();
    attempt.flush_answers().await;

    assert!(backend.persisted_answers(FIRST_ATTEMPT).is_empty());
    assert_eq!(attempt.attempt().unwrap().answers().len(), 1);
    let receipt = attempt.submit().await.unwrap();
    assert!((receipt.score - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn refused_attempt_is_unavailable() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)).closed());
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);

    let err = attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap_err();
    assert!(matches!(err, AttemptError::Unavailable { reason } if reason.contains("closed")));
    assert_eq!(attempt.status(), AttemptStatus::NotStarted);
    assert!(matches!(attempt.answer(0, text("x")), Err(AttemptError::NotStarted)));
}

#[tokio::test]
async fn second_start_is_rejected() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();

    assert!(attempt.start(QUIZ, AntiCheatSettings::disabled()).await.is_err());
    assert_eq!(backend.attempts_started(), 1);
}

//
// ─── COUNTDOWN ─────────────────────────────────────────────────────────────────
//

fn locked_down() -> AntiCheatSettings {
    AntiCheatSettings {
        enabled: true,
        monitor_focus_loss: true,
        lock_browser: true,
        webcam_proctoring: true,
        ..AntiCheatSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn expiry_submits_and_releases_monitoring() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(2)).with_time_limit(2));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, locked_down()).await.unwrap();
    attempt.answer(1, text("B")).unwrap();
    assert_eq!(host.live_tracks(), 1);

    assert_eq!(
        attempt.tick().await.unwrap(),
        Tick::Running {
            remaining_seconds: 1
        }
    );
    let Tick::Submitted(receipt) = attempt.tick().await.unwrap() else {
        panic!("expected automatic submission");
    };

    assert!((receipt.score - 50.0).abs() < f64::EPSILON);
    assert_eq!(attempt.status(), AttemptStatus::Completed);
    assert_eq!(
        attempt.monitoring().unwrap().stop_reason(),
        Some(StopReason::Expired)
    );
    assert_eq!(host.listener_count(), 0);
    assert_eq!(host.live_tracks(), 0);
    assert!(!host.is_fullscreen());
}

#[tokio::test]
async fn untimed_attempt_never_expires() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();

    for _ in 0..3 {
        assert_eq!(attempt.tick().await.unwrap(), Tick::Untimed);
    }
    assert_eq!(attempt.status(), AttemptStatus::InProgress);
}

//
// ─── NAVIGATION AWAY ───────────────────────────────────────────────────────────
//

#[tokio::test(start_paused = true)]
async fn abandoning_releases_monitoring() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, locked_down()).await.unwrap();

    attempt.abandon().unwrap();

    assert_eq!(attempt.status(), AttemptStatus::Abandoned);
    assert_eq!(
        attempt.monitoring().unwrap().stop_reason(),
        Some(StopReason::Navigation)
    );
    assert_eq!(host.listener_count(), 0);
    assert_eq!(host.live_tracks(), 0);
    assert!(!host.is_fullscreen());
    assert!(attempt.submit().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_controller_releases_monitoring() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(1)));
    let host = SimulatedHost::new();
    {
        let mut attempt = controller(&backend, &host);
        attempt.start(QUIZ, locked_down()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(host.is_fullscreen());
    }
    assert_eq!(host.listener_count(), 0);
    assert_eq!(host.live_tracks(), 0);
    assert!(!host.is_fullscreen());
}

/// Backend whose answer writes take a while to land.
struct SlowAnswers {
    inner: InMemoryBackend,
    delay: Duration,
}

#[async_trait]
impl AttemptApi for SlowAnswers {
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartedAttempt, ApiError> {
        self.inner.start_attempt(quiz_id).await
    }

    async fn persist_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
        value: &AnswerValue,
    ) -> Result<(), ApiError> {
        tokio::time::sleep(self.delay).await;
        self.inner.persist_answer(attempt_id, question_id, value).await
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> Result<SubmitReceipt, ApiError> {
        self.inner.submit_attempt(attempt_id, submission).await
    }
}

#[tokio::test(start_paused = true)]
async fn answer_writes_in_flight_survive_navigation_away() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(2)));
    let host = SimulatedHost::new();
    let slow = SlowAnswers {
        inner: backend.clone(),
        delay: Duration::from_millis(200),
    };
    {
        let mut attempt = AttemptController::new(
            Arc::new(slow),
            Arc::new(backend.clone()),
            Arc::new(host.clone()),
            fixed_clock(),
            MonitoringConfig::default(),
        );
        attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();
        attempt.answer(0, text("A")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(backend.persisted_answers(FIRST_ATTEMPT).is_empty());
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        backend.persisted_answers(FIRST_ATTEMPT).get(&QuestionId::new(1)),
        Some(&text("A"))
    );
}

#[tokio::test]
async fn finished_answer_writes_are_collected_as_answers_arrive() {
    let backend = InMemoryBackend::new();
    backend.add_quiz(QUIZ, QuizFixture::new(questions(2)));
    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, AntiCheatSettings::disabled()).await.unwrap();

    for round in 0..50 {
        attempt.answer(round % 2, text("B")).unwrap();
        tokio::task::yield_now().await;
    }
    attempt.flush_answers().await;
    assert_eq!(backend.persisted_answers(FIRST_ATTEMPT).len(), 2);
}

//
// ─── ACCESS GATE ───────────────────────────────────────────────────────────────
//

struct Guesses {
    script: Vec<Option<&'static str>>,
    asked: u32,
}

#[async_trait]
impl PasswordPrompter for Guesses {
    async fn prompt(&mut self, attempt: u32) -> Option<String> {
        self.asked = attempt;
        let index = usize::try_from(attempt - 1).ok()?;
        self.script.get(index).copied().flatten().map(str::to_string)
    }
}

fn password_quiz(backend: &InMemoryBackend) {
    let settings = AntiCheatSettings {
        enabled: true,
        require_password: true,
        monitor_focus_loss: true,
        ..AntiCheatSettings::default()
    };
    backend.add_quiz(
        QUIZ,
        QuizFixture::new(questions(1))
            .with_settings(settings)
            .with_password("opensesame"),
    );
}

#[tokio::test]
async fn correct_password_on_second_guess_opens_the_quiz() {
    let backend = InMemoryBackend::new();
    password_quiz(&backend);
    let gate = AccessGate::new(Arc::new(backend.clone()));
    let mut prompter = Guesses {
        script: vec![Some("guess"), Some("opensesame")],
        asked: 0,
    };

    let decision = gate.check_access(QUIZ, &mut prompter).await.unwrap();

    assert!(decision.proceed);
    assert_eq!(prompter.asked, 2);
    assert_eq!(backend.password_checks(), 2);
    assert_eq!(backend.attempts_started(), 0);

    let host = SimulatedHost::new();
    let mut attempt = controller(&backend, &host);
    attempt.start(QUIZ, decision.settings).await.unwrap();
    assert_eq!(backend.attempts_started(), 1);
    assert!(attempt.monitoring().unwrap().is_active());
}

#[tokio::test]
async fn cancelled_password_prompt_creates_no_attempt() {
    let backend = InMemoryBackend::new();
    password_quiz(&backend);
    let gate = AccessGate::new(Arc::new(backend.clone()));
    let mut prompter = Guesses {
        script: vec![Some("guess"), None],
        asked: 0,
    };

    let decision = gate.check_access(QUIZ, &mut prompter).await.unwrap();

    assert!(!decision.proceed);
    assert_eq!(backend.password_checks(), 1);
    assert_eq!(backend.attempts_started(), 0);
}
