use crate::model::{EventCounters, EventType, RiskLevel};

//
// ─── WEIGHTS ───────────────────────────────────────────────────────────────────
//

/// Weight of one event of each category in the suspicious score.
///
/// The values are an implementation detail. Callers may only rely on the
/// resulting level ordering `Low < Medium < High`.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskWeights {
    pub tab_switch: f64,
    pub focus_loss: f64,
    pub copy_attempt: f64,
    pub paste_attempt: f64,
    pub right_click_attempt: f64,
    pub fullscreen_exit: f64,
    pub devtools_attempt: f64,
    pub webcam_denied: f64,
}

impl RiskWeights {
    #[must_use]
    pub fn weight(&self, event_type: EventType) -> f64 {
        match event_type {
            EventType::TabSwitch => self.tab_switch,
            EventType::FocusLoss => self.focus_loss,
            EventType::CopyAttempt => self.copy_attempt,
            EventType::PasteAttempt => self.paste_attempt,
            EventType::RightClickAttempt => self.right_click_attempt,
            EventType::FullscreenExit => self.fullscreen_exit,
            EventType::DevtoolsAttempt => self.devtools_attempt,
            EventType::WebcamDenied => self.webcam_denied,
        }
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            tab_switch: 3.0,
            focus_loss: 2.0,
            copy_attempt: 2.0,
            paste_attempt: 3.0,
            right_click_attempt: 1.0,
            fullscreen_exit: 3.0,
            devtools_attempt: 5.0,
            webcam_denied: 10.0,
        }
    }
}

/// Score boundaries between levels. `medium <= score < high` is `Medium`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 10.0,
            high: 25.0,
        }
    }
}

//
// ─── SCORER ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAssessment {
    pub suspicious_score: f64,
    pub risk_level: RiskLevel,
}

/// Pure mapping from accumulated counters to a risk classification.
///
/// # Examples
///
/// ```
/// # use exam_core::model::{EventCounters, EventType, RiskLevel};
/// # use exam_core::risk::RiskScorer;
/// let counts = EventCounters::from_counts([(EventType::DevtoolsAttempt, 6)]);
/// let assessment = RiskScorer::default().assess(&counts);
/// assert_eq!(assessment.risk_level, RiskLevel::High);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskScorer {
    weights: RiskWeights,
    thresholds: RiskThresholds,
}

impl RiskScorer {
    #[must_use]
    pub fn new(weights: RiskWeights, thresholds: RiskThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    #[must_use]
    pub fn score(&self, counts: &EventCounters) -> f64 {
        counts
            .iter()
            .map(|(event_type, n)| self.weights.weight(event_type) * f64::from(n))
            .sum()
    }

    #[must_use]
    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score >= self.thresholds.high {
            RiskLevel::High
        } else if score >= self.thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    #[must_use]
    pub fn assess(&self, counts: &EventCounters) -> RiskAssessment {
        let suspicious_score = self.score(counts);
        RiskAssessment {
            suspicious_score,
            risk_level: self.level_for(suspicious_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_events_is_low_risk() {
        let assessment = RiskScorer::default().assess(&EventCounters::new());
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert!(assessment.suspicious_score.abs() < f64::EPSILON);
    }

    #[test]
    fn score_is_weighted_sum() {
        let counts = EventCounters::from_counts([(EventType::FocusLoss, 1), (EventType::CopyAttempt, 1)]);
        let scorer = RiskScorer::default();
        assert!((scorer.score(&counts) - 4.0).abs() < f64::EPSILON);
        assert_eq!(scorer.assess(&counts).risk_level, RiskLevel::Low);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let scorer = RiskScorer::default();
        assert_eq!(scorer.level_for(9.99), RiskLevel::Low);
        assert_eq!(scorer.level_for(10.0), RiskLevel::Medium);
        assert_eq!(scorer.level_for(25.0), RiskLevel::High);
    }

    #[test]
    fn more_events_never_lower_the_level() {
        let scorer = RiskScorer::default();
        let mut counts = EventCounters::new();
        let mut previous = RiskLevel::Low;
        for _ in 0..20 {
            counts.increment(EventType::TabSwitch);
            let level = scorer.assess(&counts).risk_level;
            assert!(level >= previous);
            previous = level;
        }
        assert_eq!(previous, RiskLevel::High);
    }

    #[test]
    fn custom_thresholds() {
        let scorer = RiskScorer::new(
            RiskWeights::default(),
            RiskThresholds {
                medium: 1.0,
                high: 2.0,
            },
        );
        let counts = EventCounters::from_counts([(EventType::RightClickAttempt, 1)]);
        assert_eq!(scorer.assess(&counts).risk_level, RiskLevel::Medium);
    }
}
