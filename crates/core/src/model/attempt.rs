use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId, QuizId};
use crate::model::question::{AnswerValue, Question, QuestionError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptStateError {
    #[error("cannot {action} while the attempt is {status}")]
    InvalidTransition {
        status: AttemptStatus,
        action: &'static str,
    },

    #[error("question {index} does not exist (attempt has {len} questions)")]
    QuestionOutOfRange { index: usize, len: usize },

    #[error("going back to question {} is not allowed after reaching question {}", .target + 1, .highest_visited + 1)]
    BacktrackBlocked {
        target: usize,
        highest_visited: usize,
    },

    #[error("the attempt has no questions")]
    NoQuestions,

    #[error(transparent)]
    Question(#[from] QuestionError),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of one attempt.
///
/// `NotStarted → InProgress → Submitting → Completed`, with
/// `InProgress → Expired → Submitting` when the countdown runs out.
/// `Abandoned` is terminal and only reached by navigating away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Expired,
    Submitting,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not started",
            Self::InProgress => "in progress",
            Self::Expired => "expired",
            Self::Submitting => "submitting",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        };
        f.write_str(label)
    }
}

//
// ─── VALUES ────────────────────────────────────────────────────────────────────
//

/// One answer as sent to the backend on submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub value: AnswerValue,
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining_seconds: u32 },
    /// The attempt has no time limit.
    Untimed,
    /// The countdown reached zero on this tick.
    Expired,
}

/// Snapshot of attempt progress for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptProgress {
    pub status: AttemptStatus,
    pub current_index: usize,
    pub total: usize,
    pub answered: usize,
    pub remaining_seconds: Option<u32>,
}

//
// ─── ATTEMPT SESSION ───────────────────────────────────────────────────────────
//

/// Pure state of one attempt: questions, answers, position and countdown.
///
/// All transitions are synchronous and side-effect free. Persisting answers,
/// stopping monitoring and talking to the backend is the controller's job.
#[derive(Clone)]
pub struct AttemptSession {
    attempt_id: AttemptId,
    quiz_id: QuizId,
    questions: Vec<Question>,
    current_index: usize,
    highest_visited: usize,
    remaining_seconds: Option<u32>,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl AttemptSession {
    /// Create an in-progress attempt positioned on the first question.
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError::NoQuestions` if `questions` is empty.
    pub fn new(
        attempt_id: AttemptId,
        quiz_id: QuizId,
        questions: Vec<Question>,
        remaining_seconds: Option<u32>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, AttemptStateError> {
        if questions.is_empty() {
            return Err(AttemptStateError::NoQuestions);
        }
        Ok(Self {
            attempt_id,
            quiz_id,
            questions,
            current_index: 0,
            highest_visited: 0,
            remaining_seconds,
            status: AttemptStatus::InProgress,
            started_at,
            completed_at: None,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.questions[self.current_index]
    }

    #[must_use]
    pub fn highest_visited(&self) -> usize {
        self.highest_visited
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.remaining_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn progress(&self) -> AttemptProgress {
        AttemptProgress {
            status: self.status,
            current_index: self.current_index,
            total: self.questions.len(),
            answered: self.questions.iter().filter(|q| q.is_answered()).count(),
            remaining_seconds: self.remaining_seconds,
        }
    }

    /// Every answer currently held, in question order.
    #[must_use]
    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.questions
            .iter()
            .filter_map(|q| {
                q.answer().map(|value| AnswerRecord {
                    question_id: q.id(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    fn require(&self, allowed: &[AttemptStatus], action: &'static str) -> Result<(), AttemptStateError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(AttemptStateError::InvalidTransition {
                status: self.status,
                action,
            })
        }
    }

    fn check_index(&self, index: usize) -> Result<(), AttemptStateError> {
        if index < self.questions.len() {
            Ok(())
        } else {
            Err(AttemptStateError::QuestionOutOfRange {
                index,
                len: self.questions.len(),
            })
        }
    }

    /// Store `value` as the answer to question `index`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError` if the attempt is not in progress, the index is
    /// out of range, or the value does not fit the question.
    pub fn answer(&mut self, index: usize, value: AnswerValue) -> Result<AnswerRecord, AttemptStateError> {
        self.require(&[AttemptStatus::InProgress], "answer a question")?;
        self.check_index(index)?;
        let question = &mut self.questions[index];
        let stored = question.set_answer(value)?.clone();
        Ok(AnswerRecord {
            question_id: question.id(),
            value: stored,
        })
    }

    /// Move to question `target`.
    ///
    /// With `prevent_backtrack`, any target below the highest index visited so far
    /// is rejected and the position is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError::BacktrackBlocked`, `QuestionOutOfRange`, or
    /// `InvalidTransition` when the attempt is not in progress.
    pub fn navigate(&mut self, target: usize, prevent_backtrack: bool) -> Result<usize, AttemptStateError> {
        self.require(&[AttemptStatus::InProgress], "change question")?;
        self.check_index(target)?;
        if prevent_backtrack && target < self.highest_visited {
            return Err(AttemptStateError::BacktrackBlocked {
                target,
                highest_visited: self.highest_visited,
            });
        }
        self.current_index = target;
        self.highest_visited = self.highest_visited.max(target);
        Ok(target)
    }

    /// Advance the countdown by one second.
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError::InvalidTransition` if the attempt is not in progress.
    pub fn tick(&mut self) -> Result<TickOutcome, AttemptStateError> {
        self.require(&[AttemptStatus::InProgress], "count down")?;
        let Some(remaining) = self.remaining_seconds.as_mut() else {
            return Ok(TickOutcome::Untimed);
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.status = AttemptStatus::Expired;
            return Ok(TickOutcome::Expired);
        }
        Ok(TickOutcome::Running {
            remaining_seconds: *remaining,
        })
    }

    /// Freeze the attempt for submission and return the answers to send.
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError::InvalidTransition` unless the attempt is in
    /// progress or expired.
    pub fn begin_submit(&mut self) -> Result<Vec<AnswerRecord>, AttemptStateError> {
        self.require(&[AttemptStatus::InProgress, AttemptStatus::Expired], "submit")?;
        self.status = AttemptStatus::Submitting;
        Ok(self.answers())
    }

    /// Mark a submitting attempt as accepted by the backend.
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError::InvalidTransition` unless the attempt is submitting.
    pub fn complete(&mut self, completed_at: DateTime<Utc>) -> Result<(), AttemptStateError> {
        self.require(&[AttemptStatus::Submitting], "complete")?;
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(completed_at);
        Ok(())
    }

    /// Abandon a live attempt (the student navigated away).
    ///
    /// # Errors
    ///
    /// Returns `AttemptStateError::InvalidTransition` for terminal or unstarted attempts.
    pub fn abandon(&mut self) -> Result<AttemptStatus, AttemptStateError> {
        self.require(
            &[
                AttemptStatus::InProgress,
                AttemptStatus::Expired,
                AttemptStatus::Submitting,
            ],
            "abandon",
        )?;
        let previous = self.status;
        self.status = AttemptStatus::Abandoned;
        Ok(previous)
    }
}

impl fmt::Debug for AttemptSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptSession")
            .field("attempt_id", &self.attempt_id)
            .field("quiz_id", &self.quiz_id)
            .field("questions_len", &self.questions.len())
            .field("current_index", &self.current_index)
            .field("highest_visited", &self.highest_visited)
            .field("remaining_seconds", &self.remaining_seconds)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
