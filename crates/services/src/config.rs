use std::env;
use std::time::Duration;

use api::config::{ConfigError, parse_positive};

pub const DEFAULT_CAPTURE_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_FULLSCREEN_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_REPORT_QUEUE_CAPACITY: usize = 256;

/// Shortest capture period the scheduler will run at.
pub const MIN_CAPTURE_PERIOD: Duration = Duration::from_secs(1);
/// Largest reporter queue `from_env` accepts.
pub const MAX_REPORT_QUEUE_CAPACITY: usize = 65_536;

/// Tunables of the monitoring session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitoringConfig {
    /// Time between camera snapshots after the first one. Values below
    /// `MIN_CAPTURE_PERIOD` run at `MIN_CAPTURE_PERIOD`.
    pub capture_period: Duration,
    /// Delay before fullscreen is requested again after the student leaves it.
    pub fullscreen_retry_delay: Duration,
    /// Reporter jobs that may wait for delivery before new ones are dropped.
    /// Clamped to `1..=MAX_REPORT_QUEUE_CAPACITY` when the reporter starts.
    pub report_queue_capacity: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            capture_period: DEFAULT_CAPTURE_PERIOD,
            fullscreen_retry_delay: DEFAULT_FULLSCREEN_RETRY_DELAY,
            report_queue_capacity: DEFAULT_REPORT_QUEUE_CAPACITY,
        }
    }
}

impl MonitoringConfig {
    /// Read `EXAM_CAPTURE_PERIOD_SECS`, `EXAM_FULLSCREEN_RETRY_MS` and
    /// `EXAM_REPORT_QUEUE_CAPACITY`, falling back to defaults for unset vars.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidNumber` for values that are set but not
    /// positive integers, and for a queue capacity above `MAX_REPORT_QUEUE_CAPACITY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as `from_env`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup("EXAM_CAPTURE_PERIOD_SECS") {
            config.capture_period = Duration::from_secs(parse_positive("EXAM_CAPTURE_PERIOD_SECS", &raw)?);
        }
        if let Some(raw) = lookup("EXAM_FULLSCREEN_RETRY_MS") {
            config.fullscreen_retry_delay =
                Duration::from_millis(parse_positive("EXAM_FULLSCREEN_RETRY_MS", &raw)?);
        }
        if let Some(raw) = lookup("EXAM_REPORT_QUEUE_CAPACITY") {
            let capacity = parse_positive("EXAM_REPORT_QUEUE_CAPACITY", &raw)?;
            config.report_queue_capacity = usize::try_from(capacity)
                .ok()
                .filter(|capacity| *capacity <= MAX_REPORT_QUEUE_CAPACITY)
                .ok_or(ConfigError::InvalidNumber {
                    var: "EXAM_REPORT_QUEUE_CAPACITY",
                    raw,
                })?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_capture_period(mut self, period: Duration) -> Self {
        self.capture_period = period.max(MIN_CAPTURE_PERIOD);
        self
    }

    #[must_use]
    pub fn with_fullscreen_retry_delay(mut self, delay: Duration) -> Self {
        self.fullscreen_retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_proctoring_cadence() {
        let config = MonitoringConfig::default();
        assert_eq!(config.capture_period, Duration::from_secs(30));
        assert!(config.fullscreen_retry_delay < config.capture_period);
    }

    fn vars(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let pairs = pairs.to_vec();
        move |var| {
            pairs
                .iter()
                .find(|(name, _)| *name == var)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn reads_overrides_and_keeps_defaults() {
        let config = MonitoringConfig::from_lookup(vars(&[
            ("EXAM_CAPTURE_PERIOD_SECS", "10"),
            ("EXAM_REPORT_QUEUE_CAPACITY", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.capture_period, Duration::from_secs(10));
        assert_eq!(config.fullscreen_retry_delay, DEFAULT_FULLSCREEN_RETRY_DELAY);
        assert_eq!(config.report_queue_capacity, 1024);
    }

    #[test]
    fn oversized_queue_capacity_is_rejected() {
        for raw in ["65537", "18446744073709551615"] {
            let err = MonitoringConfig::from_lookup(vars(&[("EXAM_REPORT_QUEUE_CAPACITY", raw)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidNumber {
                    var: "EXAM_REPORT_QUEUE_CAPACITY",
                    raw: raw.to_string(),
                }
            );
        }
        let config = MonitoringConfig::from_lookup(vars(&[("EXAM_REPORT_QUEUE_CAPACITY", "65536")])).unwrap();
        assert_eq!(config.report_queue_capacity, MAX_REPORT_QUEUE_CAPACITY);
    }

    #[test]
    fn capture_period_has_a_floor() {
        let config = MonitoringConfig::default().with_capture_period(Duration::ZERO);
        assert_eq!(config.capture_period, MIN_CAPTURE_PERIOD);
    }
}
