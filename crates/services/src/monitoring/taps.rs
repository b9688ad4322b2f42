use std::sync::Arc;

use exam_core::model::{Capability, EventType};

use super::host::{BrowserHost, Disposition, EventSource, HostError, ListenerId, Listener, RawEvent};

/// Callback a tap invokes once per suspicious event.
pub type EventSink = Arc<dyn Fn(EventType) + Send + Sync>;

/// Proof of an attached tap. Pass it back to `detach` to release the listeners.
#[derive(Debug, PartialEq, Eq)]
pub struct TapHandle {
    capability: Capability,
    listeners: Vec<ListenerId>,
}

impl TapHandle {
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// One browser capability that can be observed independently of the others.
pub trait CapabilityTap: Send + Sync {
    fn capability(&self) -> Capability;

    /// Start delivering events to `on_event`.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if any listener cannot be registered. Listeners that
    /// were registered before the failure are removed again.
    fn attach(&self, on_event: EventSink) -> Result<TapHandle, HostError>;

    fn detach(&self, handle: TapHandle);
}

/// DOM events each capability listens to.
#[must_use]
pub fn sources(capability: Capability) -> &'static [EventSource] {
    match capability {
        Capability::Visibility => &[EventSource::VisibilityChange],
        Capability::Focus => &[EventSource::Blur],
        Capability::Clipboard => &[EventSource::Copy, EventSource::Cut, EventSource::Paste],
        Capability::ContextMenu => &[EventSource::ContextMenu],
        Capability::Fullscreen => &[EventSource::FullscreenChange],
        Capability::KeyboardShortcut => &[EventSource::KeyDown],
    }
}

/// Map a raw event to the suspicious behavior it represents for `capability`, if any.
#[must_use]
pub fn classify(capability: Capability, event: &RawEvent) -> Option<EventType> {
    match (capability, event) {
        (Capability::Visibility, RawEvent::VisibilityChange { hidden: true }) => Some(EventType::TabSwitch),
        (Capability::Focus, RawEvent::Blur) => Some(EventType::FocusLoss),
        (Capability::Clipboard, RawEvent::Copy | RawEvent::Cut) => Some(EventType::CopyAttempt),
        (Capability::Clipboard, RawEvent::Paste) => Some(EventType::PasteAttempt),
        (Capability::ContextMenu, RawEvent::ContextMenu) => Some(EventType::RightClickAttempt),
        (Capability::Fullscreen, RawEvent::FullscreenChange { active: false }) => {
            Some(EventType::FullscreenExit)
        }
        (Capability::KeyboardShortcut, RawEvent::KeyDown(combo)) if combo.opens_devtools() => {
            Some(EventType::DevtoolsAttempt)
        }
        _ => None,
    }
}

/// Listener-backed tap for any of the six browser capabilities.
pub struct BrowserTap {
    capability: Capability,
    host: Arc<dyn BrowserHost>,
    suppress: bool,
}

impl BrowserTap {
    /// `suppress` cancels the browser default for every event the tap reports.
    #[must_use]
    pub fn new(capability: Capability, host: Arc<dyn BrowserHost>, suppress: bool) -> Self {
        Self {
            capability,
            host,
            suppress,
        }
    }
}

impl CapabilityTap for BrowserTap {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn attach(&self, on_event: EventSink) -> Result<TapHandle, HostError> {
        let capability = self.capability;
        let suppress = self.suppress;
        let mut listeners = Vec::with_capacity(sources(capability).len());

        for &source in sources(capability) {
            let sink = Arc::clone(&on_event);
            let listener: Listener = Arc::new(move |event: &RawEvent| {
                let Some(event_type) = classify(capability, event) else {
                    return Disposition::Allow;
                };
                // Counted and reported whether or not the default gets cancelled.
                sink(event_type);
                if suppress {
                    Disposition::PreventDefault
                } else {
                    Disposition::Allow
                }
            });

            match self.host.add_listener(source, listener) {
                Ok(id) => listeners.push(id),
                Err(err) => {
                    for id in listeners {
                        self.host.remove_listener(id);
                    }
                    return Err(err);
                }
            }
        }

        tracing::debug!(%capability, listeners = listeners.len(), "capability tap attached");
        Ok(TapHandle {
            capability,
            listeners,
        })
    }

    fn detach(&self, handle: TapHandle) {
        for id in handle.listeners {
            if !self.host.remove_listener(id) {
                tracing::debug!(capability = %handle.capability, ?id, "listener already removed");
            }
        }
    }
}
