use serde::{Deserialize, Serialize};

//
// ─── CAPABILITY ────────────────────────────────────────────────────────────────
//

/// A browser capability that can be tapped while an attempt is monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Visibility,
    Focus,
    Clipboard,
    ContextMenu,
    Fullscreen,
    KeyboardShortcut,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Visibility,
        Capability::Focus,
        Capability::Clipboard,
        Capability::ContextMenu,
        Capability::Fullscreen,
        Capability::KeyboardShortcut,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visibility => "visibility",
            Self::Focus => "focus",
            Self::Clipboard => "clipboard",
            Self::ContextMenu => "context_menu",
            Self::Fullscreen => "fullscreen",
            Self::KeyboardShortcut => "keyboard_shortcut",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Per-quiz anti-cheat configuration.
///
/// Fetched once when an attempt starts and never changed by the client.
/// Every monitoring flag is ignored while `enabled` is false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct AntiCheatSettings {
    pub enabled: bool,
    pub require_password: bool,
    pub shuffle_questions: bool,
    pub shuffle_answers: bool,
    pub block_copy_paste: bool,
    pub block_right_click: bool,
    pub monitor_focus_loss: bool,
    pub lock_browser: bool,
    pub webcam_proctoring: bool,
    pub prevent_backtrack: bool,
}

impl AntiCheatSettings {
    /// Settings for a quiz without any anti-cheat configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Capabilities to tap for these settings, one tap per capability.
    ///
    /// `monitor_focus_loss` taps window focus, `block_copy_paste` the clipboard,
    /// `block_right_click` the context menu, and `lock_browser` taps fullscreen,
    /// tab visibility and developer-tool shortcuts.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        if !self.enabled {
            return Vec::new();
        }
        Capability::ALL
            .into_iter()
            .filter(|cap| match cap {
                Capability::Focus => self.monitor_focus_loss,
                Capability::Clipboard => self.block_copy_paste,
                Capability::ContextMenu => self.block_right_click,
                Capability::Visibility | Capability::Fullscreen | Capability::KeyboardShortcut => {
                    self.lock_browser
                }
            })
            .collect()
    }

    /// Whether the tap for `capability` cancels the browser's default action.
    #[must_use]
    pub fn suppresses(&self, capability: Capability) -> bool {
        self.enabled
            && match capability {
                Capability::Clipboard => self.block_copy_paste,
                Capability::ContextMenu => self.block_right_click,
                Capability::KeyboardShortcut => self.lock_browser,
                Capability::Visibility | Capability::Focus | Capability::Fullscreen => false,
            }
    }

    #[must_use]
    pub fn requests_fullscreen(&self) -> bool {
        self.enabled && self.lock_browser
    }

    #[must_use]
    pub fn requests_camera(&self) -> bool {
        self.enabled && self.webcam_proctoring
    }

    #[must_use]
    pub fn needs_password(&self) -> bool {
        self.enabled && self.require_password
    }

    /// True when starting a session under these settings would acquire nothing.
    #[must_use]
    pub fn monitors_nothing(&self) -> bool {
        self.capabilities().is_empty() && !self.requests_fullscreen() && !self.requests_camera()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_settings_tap_nothing() {
        let settings = AntiCheatSettings {
            enabled: false,
            lock_browser: true,
            webcam_proctoring: true,
            ..AntiCheatSettings::default()
        };
        assert!(settings.capabilities().is_empty());
        assert!(!settings.requests_camera());
        assert!(settings.monitors_nothing());
    }

    #[test]
    fn focus_and_clipboard_flags_map_to_two_taps() {
        let settings = AntiCheatSettings {
            enabled: true,
            monitor_focus_loss: true,
            block_copy_paste: true,
            ..AntiCheatSettings::default()
        };
        assert_eq!(
            settings.capabilities(),
            vec![Capability::Focus, Capability::Clipboard]
        );
        assert!(settings.suppresses(Capability::Clipboard));
        assert!(!settings.suppresses(Capability::Focus));
    }

    #[test]
    fn lock_browser_taps_three_capabilities() {
        let settings = AntiCheatSettings {
            enabled: true,
            lock_browser: true,
            ..AntiCheatSettings::default()
        };
        assert_eq!(
            settings.capabilities(),
            vec![
                Capability::Visibility,
                Capability::Fullscreen,
                Capability::KeyboardShortcut
            ]
        );
        assert!(settings.requests_fullscreen());
    }

    #[test]
    fn deserializes_partial_camel_case_payload() {
        let settings: AntiCheatSettings =
            serde_json::from_str(r#"{"enabled":true,"requirePassword":true}"#).unwrap();
        assert!(settings.needs_password());
        assert!(!settings.prevent_backtrack);
    }
}
