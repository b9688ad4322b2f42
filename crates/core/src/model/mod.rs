mod attempt;
mod ids;
mod monitoring;
mod question;
mod report;
mod settings;

pub use attempt::{AnswerRecord, AttemptProgress, AttemptSession, AttemptStateError, AttemptStatus, TickOutcome};
pub use ids::{AttemptId, ParseIdError, QuestionId, QuizId};
pub use monitoring::{EventCounters, EventType, MonitoringEvent, Snapshot, UnknownEventType};
pub use question::{AnswerValue, Question, QuestionError, QuestionKind};
pub use report::{ProctoringReport, RiskLevel, ScreenshotRef};
pub use settings::{AntiCheatSettings, Capability};
