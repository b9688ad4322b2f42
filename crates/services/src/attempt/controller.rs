use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinSet;

use api::{ApiError, AttemptApi, BehaviorApi, SubmitReceipt, Submission};
use exam_core::Clock;
use exam_core::model::{
    AnswerValue, AntiCheatSettings, AttemptProgress, AttemptSession, AttemptStateError,
    AttemptStatus, QuizId, TickOutcome,
};

use crate::config::MonitoringConfig;
use crate::error::AttemptError;
use crate::monitoring::{BehaviorReporter, BrowserHost, MonitoringSession, StopReason};

/// Result of one countdown tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Running { remaining_seconds: u32 },
    Untimed,
    /// Time ran out and the attempt was submitted automatically.
    Submitted(SubmitReceipt),
}

/// Drives one attempt from start to submission and owns its monitoring session.
///
/// Calls are expected from a single input stream; the controller is `&mut`
/// for every transition.
pub struct AttemptController {
    attempts: Arc<dyn AttemptApi>,
    behavior: Arc<dyn BehaviorApi>,
    host: Arc<dyn BrowserHost>,
    clock: Clock,
    config: MonitoringConfig,
    settings: AntiCheatSettings,
    session: Option<AttemptSession>,
    monitoring: Option<MonitoringSession>,
    reporter: Option<BehaviorReporter>,
    submission: Option<Submission>,
    receipt: Option<SubmitReceipt>,
    persists: JoinSet<()>,
}

impl AttemptController {
    #[must_use]
    pub fn new(
        attempts: Arc<dyn AttemptApi>,
        behavior: Arc<dyn BehaviorApi>,
        host: Arc<dyn BrowserHost>,
        clock: Clock,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            attempts,
            behavior,
            host,
            clock,
            config,
            settings: AntiCheatSettings::disabled(),
            session: None,
            monitoring: None,
            reporter: None,
            submission: None,
            receipt: None,
            persists: JoinSet::new(),
        }
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.session
            .as_ref()
            .map_or(AttemptStatus::NotStarted, AttemptSession::status)
    }

    #[must_use]
    pub fn attempt(&self) -> Option<&AttemptSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn progress(&self) -> Option<AttemptProgress> {
        self.session.as_ref().map(AttemptSession::progress)
    }

    #[must_use]
    pub fn settings(&self) -> &AntiCheatSettings {
        &self.settings
    }

    /// Monitoring session of the attempt, if the settings asked for one.
    #[must_use]
    pub fn monitoring(&self) -> Option<&MonitoringSession> {
        self.monitoring.as_ref()
    }

    #[must_use]
    pub fn reporter(&self) -> Option<&BehaviorReporter> {
        self.reporter.as_ref()
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmitReceipt> {
        self.receipt.as_ref()
    }

    /// Submission frozen by the first `submit` call, kept for retries.
    #[must_use]
    pub fn pending_submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    fn session_mut(&mut self) -> Result<&mut AttemptSession, AttemptError> {
        self.session.as_mut().ok_or(AttemptError::NotStarted)
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// Allocate an attempt on the backend and start monitoring when the
    /// settings enable it.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Unavailable` if the backend refuses the attempt,
    /// `AttemptError::StartFailed` on transport failures, and
    /// `AttemptError::State` if an attempt was already started.
    pub async fn start(
        &mut self,
        quiz_id: QuizId,
        settings: AntiCheatSettings,
    ) -> Result<AttemptProgress, AttemptError> {
        if let Some(session) = &self.session {
            return Err(AttemptStateError::InvalidTransition {
                status: session.status(),
                action: "start",
            }
            .into());
        }

        let started = self
            .attempts
            .start_attempt(quiz_id)
            .await
            .map_err(|err| match err {
                ApiError::Refused { reason } => AttemptError::Unavailable { reason },
                source => AttemptError::StartFailed { source },
            })?;

        let session = AttemptSession::new(
            started.attempt_id,
            quiz_id,
            started.questions,
            started.remaining_seconds,
            self.clock.now(),
        )?;
        let attempt_id = session.attempt_id();
        tracing::info!(
            %attempt_id,
            %quiz_id,
            questions = session.questions().len(),
            remaining_seconds = ?session.remaining_seconds(),
            "attempt started"
        );

        if settings.enabled && !settings.monitors_nothing() {
            let reporter = BehaviorReporter::spawn(Arc::clone(&self.behavior), self.config.report_queue_capacity);
            let monitoring = MonitoringSession::new(
                attempt_id,
                Arc::clone(&self.host),
                self.clock,
                self.config.clone(),
            );
            monitoring.start(&settings, reporter.clone()).await;
            self.monitoring = Some(monitoring);
            self.reporter = Some(reporter);
        }

        let progress = session.progress();
        self.settings = settings;
        self.session = Some(session);
        Ok(progress)
    }

    /// Store an answer locally and persist it in the background.
    ///
    /// Persistence failures are logged only; the local answer stays authoritative.
    /// Writes in flight outlive the controller.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::State` if the attempt is not in progress or the
    /// value does not fit the question.
    pub fn answer(&mut self, index: usize, value: AnswerValue) -> Result<(), AttemptError> {
        let session = self.session_mut()?;
        let attempt_id = session.attempt_id();
        let record = session.answer(index, value)?;

        while let Some(done) = self.persists.try_join_next() {
            if let Err(err) = done {
                tracing::warn!(%attempt_id, error = %err, "answer write task failed");
            }
        }

        let api = Arc::clone(&self.attempts);
        let persist = async move {
            if let Err(err) = api
                .persist_answer(attempt_id, record.question_id, &record.value)
                .await
            {
                tracing::warn!(%attempt_id, question_id = %record.question_id, error = %err, "answer not persisted");
            }
        };
        match Handle::try_current() {
            Ok(runtime) => {
                self.persists.spawn_on(persist, &runtime);
            }
            Err(_) => {
                tracing::warn!(%attempt_id, "no runtime; answer kept locally only");
            }
        }
        Ok(())
    }

    /// Wait for every background answer write started so far.
    pub async fn flush_answers(&mut self) {
        while self.persists.join_next().await.is_some() {}
    }

    /// Move to question `target`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::State` for out-of-range targets, for attempts not
    /// in progress, and for backtracking when the settings forbid it.
    pub fn navigate(&mut self, target: usize) -> Result<usize, AttemptError> {
        let prevent_backtrack = self.settings.enabled && self.settings.prevent_backtrack;
        let session = self.session_mut()?;
        match session.navigate(target, prevent_backtrack) {
            Ok(index) => Ok(index),
            Err(err) => {
                if matches!(err, AttemptStateError::BacktrackBlocked { .. }) {
                    tracing::info!(attempt_id = %session.attempt_id(), target, "backtrack blocked");
                }
                Err(err.into())
            }
        }
    }

    /// Count one second down. Submits automatically when time runs out.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::State` if the attempt is not in progress, or the
    /// `submit` error when the automatic submission fails.
    pub async fn tick(&mut self) -> Result<Tick, AttemptError> {
        match self.session_mut()?.tick()? {
            TickOutcome::Running { remaining_seconds } => Ok(Tick::Running { remaining_seconds }),
            TickOutcome::Untimed => Ok(Tick::Untimed),
            TickOutcome::Expired => {
                tracing::info!("time is up; submitting automatically");
                self.submit().await.map(Tick::Submitted)
            }
        }
    }

    /// Submit the attempt.
    ///
    /// The first call freezes the answers and stops monitoring. If the backend
    /// cannot be reached the attempt stays `Submitting` and a later call sends
    /// the same frozen submission again. Once completed, returns the receipt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::SubmitFailed` when the backend call fails and
    /// `AttemptError::State` when the attempt cannot be submitted.
    pub async fn submit(&mut self) -> Result<SubmitReceipt, AttemptError> {
        let session = self.session.as_mut().ok_or(AttemptError::NotStarted)?;
        if session.status() == AttemptStatus::Completed {
            if let Some(receipt) = &self.receipt {
                return Ok(receipt.clone());
            }
        }

        let submission = match &self.submission {
            Some(frozen) if session.status() == AttemptStatus::Submitting => frozen.clone(),
            _ => {
                let expired = session.status() == AttemptStatus::Expired;
                let answers = session.begin_submit()?;
                if let Some(monitoring) = &self.monitoring {
                    let reason = if expired {
                        StopReason::Expired
                    } else {
                        StopReason::Submitted
                    };
                    monitoring.stop(reason);
                }
                let frozen = Submission::new(answers);
                self.submission = Some(frozen.clone());
                frozen
            }
        };

        let attempt_id = session.attempt_id();
        match self.attempts.submit_attempt(attempt_id, &submission).await {
            Ok(receipt) => {
                session.complete(self.clock.now())?;
                tracing::info!(%attempt_id, score = receipt.score, "attempt submitted");
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(source) => {
                tracing::warn!(%attempt_id, error = %source, "submission failed; kept for retry");
                Err(AttemptError::SubmitFailed { source })
            }
        }
    }

    /// Leave the attempt without submitting. Monitoring is torn down.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::State` if the attempt is not live.
    pub fn abandon(&mut self) -> Result<(), AttemptError> {
        let session = self.session.as_mut().ok_or(AttemptError::NotStarted)?;
        let previous = session.abandon()?;
        if previous == AttemptStatus::Submitting {
            tracing::warn!(attempt_id = %session.attempt_id(), "abandoned with a submission still pending");
        } else {
            tracing::info!(attempt_id = %session.attempt_id(), %previous, "attempt abandoned");
        }
        if let Some(monitoring) = &self.monitoring {
            monitoring.stop(StopReason::Navigation);
        }
        Ok(())
    }
}

impl Drop for AttemptController {
    // Answer writes already sent keep running after navigation away.
    fn drop(&mut self) {
        self.persists.detach_all();
    }
}
