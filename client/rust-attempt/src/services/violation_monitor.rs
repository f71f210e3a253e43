use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::metrics::VIOLATIONS_DETECTED_TOTAL;
use crate::models::violation::{EnvironmentSignal, KeyEvent, Violation, ViolationKind};

/// Source of host environment signals (visibility, focus, context menu, keys).
///
/// The browser/webview shell binds this to real window events; tests and the
/// terminal driver feed it through a channel.
#[async_trait]
pub trait SignalSource: Send {
    /// Next signal, or `None` once the source is closed.
    async fn next_signal(&mut self) -> Option<EnvironmentSignal>;

    /// A signal that is already queued, without waiting.
    fn try_next_signal(&mut self) -> Option<EnvironmentSignal> {
        None
    }
}

/// Sending half handed to whatever produces the signals.
#[derive(Debug, Clone)]
pub struct SignalEmitter {
    sender: mpsc::UnboundedSender<EnvironmentSignal>,
}

impl SignalEmitter {
    /// Returns `false` once the attempt screen is gone.
    pub fn emit(&self, signal: EnvironmentSignal) -> bool {
        self.sender.send(signal).is_ok()
    }
}

#[derive(Debug)]
pub struct ChannelSignalSource {
    receiver: mpsc::UnboundedReceiver<EnvironmentSignal>,
}

impl ChannelSignalSource {
    pub fn channel() -> (SignalEmitter, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (SignalEmitter { sender }, Self { receiver })
    }
}

#[async_trait]
impl SignalSource for ChannelSignalSource {
    async fn next_signal(&mut self) -> Option<EnvironmentSignal> {
        self.receiver.recv().await
    }

    fn try_next_signal(&mut self) -> Option<EnvironmentSignal> {
        self.receiver.try_recv().ok()
    }
}

/// Maps a raw signal to the violation it represents, if any.
pub fn classify(signal: &EnvironmentSignal) -> Option<ViolationKind> {
    match signal {
        EnvironmentSignal::VisibilityChange { hidden: true } => Some(ViolationKind::FocusLost),
        EnvironmentSignal::VisibilityChange { hidden: false } => None,
        EnvironmentSignal::WindowBlur | EnvironmentSignal::PageHide => {
            Some(ViolationKind::FocusLost)
        }
        EnvironmentSignal::ContextMenu => Some(ViolationKind::ContextMenu),
        EnvironmentSignal::KeyDown(key) if is_screenshot_shortcut(key) => {
            Some(ViolationKind::ScreenshotShortcut)
        }
        EnvironmentSignal::KeyDown(_) => None,
    }
}

/// PrintScreen, or Ctrl/Cmd+Shift+S/4/5.
pub fn is_screenshot_shortcut(event: &KeyEvent) -> bool {
    let key = event.key.to_lowercase();
    key == "printscreen"
        || ((event.ctrl || event.meta) && event.shift && matches!(key.as_str(), "s" | "4" | "5"))
}

/// Watches a `SignalSource` and yields violations.
///
/// Whether a violation may still force a submission is decided by the attempt
/// session; the monitor only detects.
pub struct ViolationMonitor<S> {
    source: S,
    closed: bool,
}

impl<S: SignalSource> ViolationMonitor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Waits for the next violating signal. Harmless signals are skipped.
    pub async fn next_violation(&mut self) -> Option<Violation> {
        while !self.closed {
            match self.source.next_signal().await {
                Some(signal) => {
                    if let Some(violation) = Self::detect(&signal) {
                        return Some(violation);
                    }
                }
                None => {
                    tracing::debug!("Signal source closed; violation monitor stopped");
                    self.closed = true;
                }
            }
        }
        None
    }

    /// Discards signals that arrived while the monitor was detached.
    pub fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        while self.source.try_next_signal().is_some() {
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!("Ignored {} signals received while detached", drained);
        }
        drained
    }

    fn detect(signal: &EnvironmentSignal) -> Option<Violation> {
        let kind = classify(signal)?;
        VIOLATIONS_DETECTED_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        tracing::warn!(
            "Violation detected: kind={}, signal={:?}, suppress_default={}",
            kind.as_str(),
            signal,
            kind.suppresses_default()
        );
        Some(Violation::from(kind))
    }
}
