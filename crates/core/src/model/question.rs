use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("{kind} questions need at least one option")]
    MissingOptions { kind: QuestionKind },

    #[error("this answer does not fit a {kind} question")]
    KindMismatch { kind: QuestionKind },

    #[error("option {index} does not exist (question has {len} options)")]
    OptionOutOfRange { index: usize, len: usize },

    #[error("select at least one option")]
    EmptySelection,
}

//
// ─── KIND ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiSelect,
    ShortAnswer,
    Essay,
}

impl QuestionKind {
    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultiSelect)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::MultiSelect => "multi_select",
            Self::ShortAnswer => "short_answer",
            Self::Essay => "essay",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::SingleChoice => "single-choice",
            Self::MultiSelect => "multi-select",
            Self::ShortAnswer => "short-answer",
            Self::Essay => "essay",
        };
        f.write_str(label)
    }
}

//
// ─── ANSWER ────────────────────────────────────────────────────────────────────
//

/// The value a student puts into a question's answer slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Index of the chosen option.
    Choice(usize),
    /// Indices of all chosen options, sorted and deduplicated.
    Choices(Vec<usize>),
    Text(String),
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// One question of an attempt, together with the student's current answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    kind: QuestionKind,
    options: Vec<String>,
    answer: Option<AnswerValue>,
}

impl Question {
    /// Build a question as served by the backend.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` for blank text and
    /// `QuestionError::MissingOptions` for a choice question without options.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        kind: QuestionKind,
        options: Vec<String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if kind.is_choice() && options.is_empty() {
            return Err(QuestionError::MissingOptions { kind });
        }
        let options = if kind.is_choice() { options } else { Vec::new() };

        Ok(Self {
            id,
            text,
            kind,
            options,
            answer: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn answer(&self) -> Option<&AnswerValue> {
        self.answer.as_ref()
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Validate `value` against this question and store it.
    ///
    /// Multi-select answers are normalized (sorted, deduplicated) before storing.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the value does not fit the question kind or
    /// references a missing option. The previous answer is kept on error.
    pub fn set_answer(&mut self, value: AnswerValue) -> Result<&AnswerValue, QuestionError> {
        let normalized = self.normalize(value)?;
        Ok(self.answer.insert(normalized))
    }

    fn normalize(&self, value: AnswerValue) -> Result<AnswerValue, QuestionError> {
        let len = self.options.len();
        match (self.kind, value) {
            (QuestionKind::SingleChoice, AnswerValue::Choice(index)) => {
                if index >= len {
                    return Err(QuestionError::OptionOutOfRange { index, len });
                }
                Ok(AnswerValue::Choice(index))
            }
            (QuestionKind::MultiSelect, AnswerValue::Choices(mut indices)) => {
                if indices.is_empty() {
                    return Err(QuestionError::EmptySelection);
                }
                indices.sort_unstable();
                indices.dedup();
                if let Some(&index) = indices.iter().find(|&&i| i >= len) {
                    return Err(QuestionError::OptionOutOfRange { index, len });
                }
                Ok(AnswerValue::Choices(indices))
            }
            (QuestionKind::MultiSelect, AnswerValue::Choice(index)) => {
                self.normalize(AnswerValue::Choices(vec![index]))
            }
            (QuestionKind::ShortAnswer, AnswerValue::Text(text)) => {
                Ok(AnswerValue::Text(text.trim().to_string()))
            }
            (QuestionKind::Essay, AnswerValue::Text(text)) => Ok(AnswerValue::Text(text)),
            (kind, _) => Err(QuestionError::KindMismatch { kind }),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(kind: QuestionKind) -> Question {
        Question::new(
            QuestionId::new(1),
            "Pick",
            kind,
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap()
    }

    #[test]
    fn choice_question_requires_options() {
        let err = Question::new(QuestionId::new(1), "Q", QuestionKind::SingleChoice, Vec::new())
            .unwrap_err();
        assert_eq!(
            err,
            QuestionError::MissingOptions {
                kind: QuestionKind::SingleChoice
            }
        );
    }

    #[test]
    fn blank_text_rejected() {
        let err =
            Question::new(QuestionId::new(1), "  ", QuestionKind::Essay, Vec::new()).unwrap_err();
        assert_eq!(err, QuestionError::EmptyText);
    }

    #[test]
    fn single_choice_checks_range() {
        let mut q = choice(QuestionKind::SingleChoice);
        let err = q.set_answer(AnswerValue::Choice(3)).unwrap_err();
        assert_eq!(err, QuestionError::OptionOutOfRange { index: 3, len: 3 });
        assert!(!q.is_answered());

        q.set_answer(AnswerValue::Choice(2)).unwrap();
        assert_eq!(q.answer(), Some(&AnswerValue::Choice(2)));
    }

    #[test]
    fn multi_select_is_normalized() {
        let mut q = choice(QuestionKind::MultiSelect);
        q.set_answer(AnswerValue::Choices(vec![2, 0, 2])).unwrap();
        assert_eq!(q.answer(), Some(&AnswerValue::Choices(vec![0, 2])));

        let err = q.set_answer(AnswerValue::Choices(Vec::new())).unwrap_err();
        assert_eq!(err, QuestionError::EmptySelection);
        assert_eq!(q.answer(), Some(&AnswerValue::Choices(vec![0, 2])));
    }

    #[test]
    fn text_answer_on_choice_question_is_a_mismatch() {
        let mut q = choice(QuestionKind::SingleChoice);
        let err = q.set_answer(AnswerValue::Text("A".into())).unwrap_err();
        assert!(matches!(err, QuestionError::KindMismatch { .. }));
    }

    #[test]
    fn short_answer_is_trimmed_but_essay_is_not() {
        let mut short =
            Question::new(QuestionId::new(2), "Name", QuestionKind::ShortAnswer, Vec::new())
                .unwrap();
        short.set_answer(AnswerValue::Text("  Ada ".into())).unwrap();
        assert_eq!(short.answer(), Some(&AnswerValue::Text("Ada".into())));

        let mut essay =
            Question::new(QuestionId::new(3), "Discuss", QuestionKind::Essay, Vec::new()).unwrap();
        essay.set_answer(AnswerValue::Text("  body\n".into())).unwrap();
        assert_eq!(essay.answer(), Some(&AnswerValue::Text("  body\n".into())));
    }

    #[test]
    fn answer_value_wire_shape() {
        let json = serde_json::to_value(AnswerValue::Choices(vec![1, 2])).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "choices", "value": [1, 2]}));
    }
}
