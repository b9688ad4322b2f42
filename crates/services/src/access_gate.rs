use std::sync::Arc;

use async_trait::async_trait;

use api::SettingsApi;
use exam_core::model::{AntiCheatSettings, QuizId};

use crate::error::AccessError;

/// Source of password guesses, usually a dialog shown to the student.
#[async_trait]
pub trait PasswordPrompter: Send {
    /// Ask for a password. `attempt` starts at 1 and grows after each wrong
    /// guess. `None` means the student cancelled.
    async fn prompt(&mut self, attempt: u32) -> Option<String>;
}

/// Outcome of the pre-start check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub settings: AntiCheatSettings,
    pub proceed: bool,
}

/// Decides whether an attempt may start, prompting for the quiz password when
/// the settings require one.
#[derive(Clone)]
pub struct AccessGate {
    settings: Arc<dyn SettingsApi>,
}

impl AccessGate {
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsApi>) -> Self {
        Self { settings }
    }

    /// Fetch the quiz settings and run the password check if needed.
    ///
    /// Wrong passwords are re-prompted without limit; only a correct password
    /// or a cancelled prompt ends the loop. Nothing is kept between calls.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Settings` if the settings cannot be fetched and
    /// `AccessError::Verification` if a password cannot be checked.
    pub async fn check_access(
        &self,
        quiz_id: QuizId,
        prompter: &mut dyn PasswordPrompter,
    ) -> Result<AccessDecision, AccessError> {
        let settings = self
            .settings
            .get_settings(quiz_id)
            .await
            .map_err(|source| AccessError::Settings { source })?
            .unwrap_or_else(AntiCheatSettings::disabled);

        if !settings.needs_password() {
            tracing::debug!(%quiz_id, enabled = settings.enabled, "no password required");
            return Ok(AccessDecision {
                settings,
                proceed: true,
            });
        }

        let mut attempt = 1;
        loop {
            let Some(password) = prompter.prompt(attempt).await else {
                tracing::info!(%quiz_id, attempt, "password prompt cancelled");
                return Ok(AccessDecision {
                    settings,
                    proceed: false,
                });
            };

            let valid = self
                .settings
                .verify_password(quiz_id, &password)
                .await
                .map_err(|source| AccessError::Verification { source })?;
            if valid {
                tracing::info!(%quiz_id, attempt, "quiz password accepted");
                return Ok(AccessDecision {
                    settings,
                    proceed: true,
                });
            }

            tracing::info!(%quiz_id, attempt, "wrong quiz password");
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{InMemoryBackend, QuizFixture};
    use exam_core::model::{Question, QuestionId, QuestionKind};
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Option<String>>);

    #[async_trait]
    impl PasswordPrompter for Scripted {
        async fn prompt(&mut self, _attempt: u32) -> Option<String> {
            self.0.pop_front().flatten()
        }
    }

    fn quiz() -> QuizFixture {
        let question = Question::new(QuestionId::new(1), "2 + 2?", QuestionKind::ShortAnswer, Vec::new()).unwrap();
        QuizFixture::new(vec![question])
    }

    fn locked() -> AntiCheatSettings {
        AntiCheatSettings {
            enabled: true,
            require_password: true,
            ..AntiCheatSettings::default()
        }
    }

    #[tokio::test]
    async fn quiz_without_settings_proceeds() {
        let backend = InMemoryBackend::new();
        backend.add_quiz(QuizId::new(1), quiz());
        let gate = AccessGate::new(Arc::new(backend.clone()));

        let decision = gate
            .check_access(QuizId::new(1), &mut Scripted(VecDeque::new()))
            .await
            .unwrap();
        assert!(decision.proceed);
        assert!(!decision.settings.enabled);
        assert_eq!(backend.password_checks(), 0);
    }

    #[tokio::test]
    async fn disabled_settings_skip_the_password() {
        let backend = InMemoryBackend::new();
        let settings = AntiCheatSettings {
            enabled: false,
            ..locked()
        };
        backend.add_quiz(QuizId::new(1), quiz().with_settings(settings).with_password("pw"));
        let gate = AccessGate::new(Arc::new(backend.clone()));

        let decision = gate
            .check_access(QuizId::new(1), &mut Scripted(VecDeque::new()))
            .await
            .unwrap();
        assert!(decision.proceed);
        assert_eq!(backend.password_checks(), 0);
    }

    #[tokio::test]
    async fn cancelling_the_prompt_denies_access() {
        let backend = InMemoryBackend::new();
        backend.add_quiz(QuizId::new(1), quiz().with_settings(locked()).with_password("pw"));
        let gate = AccessGate::new(Arc::new(backend.clone()));

        let mut prompter = Scripted(VecDeque::from([Some("nope".to_string()), None]));
        let decision = gate.check_access(QuizId::new(1), &mut prompter).await.unwrap();
        assert!(!decision.proceed);
        assert_eq!(backend.password_checks(), 1);
    }

    #[tokio::test]
    async fn settings_failure_is_reported() {
        let backend = InMemoryBackend::new();
        backend.add_quiz(QuizId::new(1), quiz());
        backend.set_settings_failing(true);
        let gate = AccessGate::new(Arc::new(backend));

        let err = gate
            .check_access(QuizId::new(1), &mut Scripted(VecDeque::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Settings { .. }));
    }
}
