use serde::{Deserialize, Serialize};

pub const FOCUS_LOST_REASON: &str = "Student switched tab or app during active test";
pub const CONTEXT_MENU_REASON: &str =
    "Opened context menu during active test (possible capture attempt)";
pub const SCREENSHOT_REASON: &str = "Screenshot shortcut detected during active test";

/// Raw environment signal delivered by the host shell (browser window, webview, terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvironmentSignal {
    VisibilityChange { hidden: bool },
    WindowBlur,
    PageHide,
    ContextMenu,
    KeyDown(KeyEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FocusLost,
    ContextMenu,
    ScreenshotShortcut,
}

impl ViolationKind {
    pub fn reason(&self) -> &'static str {
        match self {
            ViolationKind::FocusLost => FOCUS_LOST_REASON,
            ViolationKind::ContextMenu => CONTEXT_MENU_REASON,
            ViolationKind::ScreenshotShortcut => SCREENSHOT_REASON,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::FocusLost => "focus_lost",
            ViolationKind::ContextMenu => "context_menu",
            ViolationKind::ScreenshotShortcut => "screenshot_shortcut",
        }
    }

    /// Whether the host should cancel the default action of the originating event.
    pub fn suppresses_default(&self) -> bool {
        matches!(
            self,
            ViolationKind::ContextMenu | ViolationKind::ScreenshotShortcut
        )
    }
}

/// A detected violation, carried into the forced submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub reason: String,
}

impl From<ViolationKind> for Violation {
    fn from(kind: ViolationKind) -> Self {
        Self {
            kind,
            reason: kind.reason().to_string(),
        }
    }
}
