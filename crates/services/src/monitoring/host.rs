//! Seam between the monitoring core and the browser it runs in.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    #[error("permission denied for {0}")]
    PermissionDenied(&'static str),
    #[error("{0} is not supported here")]
    Unsupported(&'static str),
    #[error("the media stream has ended")]
    StreamEnded,
    #[error("device error: {0}")]
    Device(String),
}

/// DOM event a listener can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSource {
    VisibilityChange,
    Blur,
    Copy,
    Cut,
    Paste,
    ContextMenu,
    FullscreenChange,
    KeyDown,
}

/// A key press with its modifier state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyCombo {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyCombo {
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Parse combos written like `Ctrl+Shift+I` or `F12`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut combo = Self::default();
        let mut parts: Vec<&str> = raw.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|k| !k.is_empty())?;
        for modifier in parts {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => combo.ctrl = true,
                "shift" => combo.shift = true,
                "alt" | "option" => combo.alt = true,
                "meta" | "cmd" | "super" => combo.meta = true,
                _ => return None,
            }
        }
        combo.key = key.to_string();
        Some(combo)
    }

    fn key_is(&self, expected: &str) -> bool {
        self.key.eq_ignore_ascii_case(expected)
    }

    /// Shortcuts that open developer tools or the page source.
    #[must_use]
    pub fn opens_devtools(&self) -> bool {
        if self.key_is("F12") {
            return true;
        }
        let inspector = ["I", "J", "C"].iter().any(|k| self.key_is(k));
        (self.ctrl && self.shift && inspector)
            || (self.meta && self.alt && inspector)
            || (self.ctrl && !self.shift && self.key_is("U"))
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (held, label) in [
            (self.ctrl, "Ctrl+"),
            (self.meta, "Meta+"),
            (self.alt, "Alt+"),
            (self.shift, "Shift+"),
        ] {
            if held {
                f.write_str(label)?;
            }
        }
        f.write_str(&self.key)
    }
}

/// A raw event as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    VisibilityChange { hidden: bool },
    Blur,
    Copy,
    Cut,
    Paste,
    ContextMenu,
    FullscreenChange { active: bool },
    KeyDown(KeyCombo),
}

impl RawEvent {
    #[must_use]
    pub fn source(&self) -> EventSource {
        match self {
            RawEvent::VisibilityChange { .. } => EventSource::VisibilityChange,
            RawEvent::Blur => EventSource::Blur,
            RawEvent::Copy => EventSource::Copy,
            RawEvent::Cut => EventSource::Cut,
            RawEvent::Paste => EventSource::Paste,
            RawEvent::ContextMenu => EventSource::ContextMenu,
            RawEvent::FullscreenChange { .. } => EventSource::FullscreenChange,
            RawEvent::KeyDown(_) => EventSource::KeyDown,
        }
    }
}

/// What a listener asks the host to do with the event's default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Allow,
    PreventDefault,
}

pub type Listener = Arc<dyn Fn(&RawEvent) -> Disposition + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Encoded still frame as produced by a camera stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Browser facilities the monitoring session needs.
///
/// Listener registration and teardown calls are synchronous so that every
/// teardown path, `Drop` included, can release resources without awaiting.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// # Errors
    ///
    /// Returns `HostError::Unsupported` if the host cannot deliver `source` events.
    fn add_listener(&self, source: EventSource, listener: Listener) -> Result<ListenerId, HostError>;

    /// Returns false if the listener was already gone.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// # Errors
    ///
    /// Returns `HostError` if the browser refuses fullscreen.
    async fn request_fullscreen(&self) -> Result<(), HostError>;

    /// Leave fullscreen. Returns false if fullscreen was not held.
    fn exit_fullscreen(&self) -> bool;

    fn is_fullscreen(&self) -> bool;

    /// # Errors
    ///
    /// Returns `HostError::PermissionDenied` when the student blocks the camera.
    async fn open_camera(&self) -> Result<Arc<dyn CameraStream>, HostError>;
}

/// A live camera stream.
#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Resolves once frames can be read.
    ///
    /// # Errors
    ///
    /// Returns `HostError::StreamEnded` if the stream dies before becoming ready.
    async fn ready(&self) -> Result<(), HostError>;

    /// # Errors
    ///
    /// Returns `HostError::StreamEnded` once the stream is gone for good; other
    /// errors affect only this frame.
    async fn capture_frame(&self) -> Result<CapturedFrame, HostError>;

    /// Stop every track. Calling it again is a no-op.
    fn stop(&self);

    fn live_tracks(&self) -> usize;
}
