use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::monitoring::{EventCounters, MonitoringEvent};

/// Coarse classification of an attempt's integrity risk. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a stored camera snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRef {
    pub captured_at: DateTime<Utc>,
    pub url: String,
}

/// Server-computed proctoring summary for one attempt. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringReport {
    pub risk_level: RiskLevel,
    pub suspicious_score: f64,
    pub per_category_counts: EventCounters,
    pub screenshots: Vec<ScreenshotRef>,
    pub events: Vec<MonitoringEvent>,
}

impl ProctoringReport {
    /// Events sorted by when they occurred.
    ///
    /// The backend does not promise delivery order, so callers rendering a
    /// timeline should use this instead of `events`.
    #[must_use]
    pub fn timeline(&self) -> Vec<&MonitoringEvent> {
        let mut events: Vec<_> = self.events.iter().collect();
        events.sort_by_key(|e| (e.occurred_at(), e.event_type(), e.sequence_in_category()));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn timeline_orders_by_time() {
        let later = MonitoringEvent::new(EventType::CopyAttempt, fixed_now() + Duration::seconds(5), 1);
        let earlier = MonitoringEvent::new(EventType::FocusLoss, fixed_now(), 1);
        let report = ProctoringReport {
            risk_level: RiskLevel::Low,
            suspicious_score: 0.0,
            per_category_counts: EventCounters::new(),
            screenshots: Vec::new(),
            events: vec![later.clone(), earlier.clone()],
        };
        assert_eq!(report.timeline(), vec![&earlier, &later]);
    }
}
