use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

//
// ─── EVENT TYPE ────────────────────────────────────────────────────────────────
//

/// Category of a suspicious behavior observed during an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TabSwitch,
    FocusLoss,
    CopyAttempt,
    PasteAttempt,
    RightClickAttempt,
    FullscreenExit,
    DevtoolsAttempt,
    WebcamDenied,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::TabSwitch,
        EventType::FocusLoss,
        EventType::CopyAttempt,
        EventType::PasteAttempt,
        EventType::RightClickAttempt,
        EventType::FullscreenExit,
        EventType::DevtoolsAttempt,
        EventType::WebcamDenied,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::FocusLoss => "focus_loss",
            Self::CopyAttempt => "copy_attempt",
            Self::PasteAttempt => "paste_attempt",
            Self::RightClickAttempt => "right_click_attempt",
            Self::FullscreenExit => "fullscreen_exit",
            Self::DevtoolsAttempt => "devtools_attempt",
            Self::WebcamDenied => "webcam_denied",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown monitoring event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

//
// ─── EVENT ─────────────────────────────────────────────────────────────────────
//

/// One observed behavior. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringEvent {
    #[serde(rename = "type")]
    event_type: EventType,
    occurred_at: DateTime<Utc>,
    sequence_in_category: u32,
}

impl MonitoringEvent {
    #[must_use]
    pub fn new(event_type: EventType, occurred_at: DateTime<Utc>, sequence_in_category: u32) -> Self {
        Self {
            event_type,
            occurred_at,
            sequence_in_category,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// 1-based position of this event among events of the same type.
    #[must_use]
    pub fn sequence_in_category(&self) -> u32 {
        self.sequence_in_category
    }
}

//
// ─── COUNTERS ──────────────────────────────────────────────────────────────────
//

/// Per-category event counts. Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCounters(BTreeMap<EventType, u32>);

impl EventCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild counters from persisted `(type, count)` pairs. Zero counts are dropped.
    #[must_use]
    pub fn from_counts(counts: impl IntoIterator<Item = (EventType, u32)>) -> Self {
        Self(counts.into_iter().filter(|(_, n)| *n > 0).collect())
    }

    /// Bump the counter for `event_type` and return its new value.
    pub fn increment(&mut self, event_type: EventType) -> u32 {
        let slot = self.0.entry(event_type).or_insert(0);
        *slot = slot.saturating_add(1);
        *slot
    }

    #[must_use]
    pub fn get(&self, event_type: EventType) -> u32 {
        self.0.get(&event_type).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.0.values().fold(0_u32, |acc, n| acc.saturating_add(*n))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventType, u32)> + '_ {
        self.0.iter().map(|(t, n)| (*t, *n))
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// A still frame taken from the proctoring camera.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("captured_at", &self.captured_at)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
