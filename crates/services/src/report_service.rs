use std::sync::Arc;

use api::ReportApi;
use exam_core::model::{AttemptId, ProctoringReport};
use exam_core::risk::{RiskAssessment, RiskScorer};

use crate::error::ReportError;

/// A proctoring report alongside the client's own reading of its counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView {
    pub report: ProctoringReport,
    pub local: RiskAssessment,
}

impl ReportView {
    /// True when the server's risk level matches the local scorer.
    #[must_use]
    pub fn agrees(&self) -> bool {
        self.report.risk_level == self.local.risk_level
    }
}

/// Read side of proctoring for instructors.
#[derive(Clone)]
pub struct ReportService {
    api: Arc<dyn ReportApi>,
    scorer: RiskScorer,
}

impl ReportService {
    #[must_use]
    pub fn new(api: Arc<dyn ReportApi>) -> Self {
        Self::with_scorer(api, RiskScorer::default())
    }

    #[must_use]
    pub fn with_scorer(api: Arc<dyn ReportApi>, scorer: RiskScorer) -> Self {
        Self { api, scorer }
    }

    /// Load the report of one attempt.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::NotFound` for unknown attempts and
    /// `ReportError::Backend` for any other backend failure.
    pub async fn load(&self, attempt_id: AttemptId) -> Result<ReportView, ReportError> {
        let report = self.api.get_proctoring_report(attempt_id).await?;
        let local = self.scorer.assess(&report.per_category_counts);
        if report.risk_level != local.risk_level {
            tracing::debug!(
                %attempt_id,
                server = %report.risk_level,
                local = %local.risk_level,
                "risk level differs from local weights"
            );
        }
        Ok(ReportView { report, local })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{BehaviorApi, InMemoryBackend};
    use exam_core::model::{EventType, MonitoringEvent, RiskLevel};
    use exam_core::time::fixed_now;

    #[tokio::test]
    async fn local_assessment_matches_backend_scoring() {
        let backend = InMemoryBackend::new();
        let attempt = AttemptId::new(3);
        for seq in 1..=2 {
            backend
                .record_behavior(attempt, &MonitoringEvent::new(EventType::WebcamDenied, fixed_now(), seq))
                .await
                .unwrap();
        }

        let view = ReportService::new(Arc::new(backend)).load(attempt).await.unwrap();
        assert_eq!(view.report.per_category_counts.get(EventType::WebcamDenied), 2);
        assert_eq!(view.local.risk_level, RiskLevel::Medium);
        assert!(view.agrees());
    }

    #[tokio::test]
    async fn unknown_attempt_is_not_found() {
        let service = ReportService::new(Arc::new(InMemoryBackend::new()));
        let err = service.load(AttemptId::new(77)).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound));
    }
}
