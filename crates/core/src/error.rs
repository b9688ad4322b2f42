use thiserror::Error;

use crate::model::{AttemptStateError, ParseIdError, QuestionError, UnknownEventType};

/// Umbrella error for callers that do not care which domain rule failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    AttemptState(#[from] AttemptStateError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
    #[error(transparent)]
    EventType(#[from] UnknownEventType),
}
