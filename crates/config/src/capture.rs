//! Record-next-keypress state for editing key binding settings.

use crate::settings::{UNBOUND, normalize_key, validate_binding};

/// The `(module, setting)` pair a capture writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub module: String,
    pub setting: String,
}

/// What a fed key did to the capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResult {
    /// The key was recorded; store `key` as the new binding.
    Bound { target: CaptureTarget, key: String },
    /// Backspace/Delete: store the unbound sentinel.
    Cleared { target: CaptureTarget },
    /// Escape: leave the binding unchanged.
    Cancelled { target: CaptureTarget },
}

impl CaptureResult {
    /// The binding value to store, if any.
    pub fn binding(&self) -> Option<&str> {
        match self {
            Self::Bound { key, .. } => Some(key),
            Self::Cleared { .. } => Some(UNBOUND),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn target(&self) -> &CaptureTarget {
        match self {
            Self::Bound { target, .. } | Self::Cleared { target } | Self::Cancelled { target } => {
                target
            }
        }
    }
}

/// Single capture slot. At most one binding is being recorded at a time, and
/// the slot is released by every outcome of [`KeyCapture::feed`] and by
/// [`KeyCapture::cancel`].
#[derive(Debug, Default)]
pub struct KeyCapture {
    slot: Option<CaptureTarget>,
}

impl KeyCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording for `module.setting`, replacing any capture in progress.
    pub fn begin(&mut self, module: &str, setting: &str) {
        self.slot = Some(CaptureTarget {
            module: module.to_string(),
            setting: setting.to_string(),
        });
    }

    pub fn is_recording(&self) -> bool {
        self.slot.is_some()
    }

    pub fn target(&self) -> Option<&CaptureTarget> {
        self.slot.as_ref()
    }

    /// Abandon the capture in progress.
    pub fn cancel(&mut self) -> Option<CaptureTarget> {
        self.slot.take()
    }

    /// Offer a key press. Returns `None` when not recording.
    ///
    /// A key that cannot be stored as a binding (for example one containing
    /// `+`) cancels the capture.
    pub fn feed(&mut self, key: &str) -> Option<CaptureResult> {
        let target = self.slot.take()?;
        let key = normalize_key(key);
        let result = match key.as_str() {
            "escape" | "esc" => CaptureResult::Cancelled { target },
            "backspace" | "delete" => CaptureResult::Cleared { target },
            _ if validate_binding(&key).is_ok() && key != UNBOUND => {
                CaptureResult::Bound { target, key }
            }
            _ => CaptureResult::Cancelled { target },
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_records_and_releases() {
        let mut cap = KeyCapture::new();
        assert_eq!(cap.feed("a"), None);
        cap.begin("clear_queue", "bind");
        let r = cap.feed("C").unwrap();
        assert_eq!(r.binding(), Some("c"));
        assert_eq!(r.target().module, "clear_queue");
        assert!(!cap.is_recording());
    }

    #[test]
    fn escape_cancels_and_backspace_clears() {
        let mut cap = KeyCapture::new();
        cap.begin("m", "bind");
        assert!(matches!(cap.feed("Escape"), Some(CaptureResult::Cancelled { .. })));
        assert!(!cap.is_recording());

        cap.begin("m", "bind");
        let r = cap.feed("Backspace").unwrap();
        assert_eq!(r.binding(), Some("none"));
        assert!(!cap.is_recording());
    }

    #[test]
    fn explicit_cancel_releases() {
        let mut cap = KeyCapture::new();
        cap.begin("m", "bind");
        assert_eq!(cap.cancel().unwrap().setting, "bind");
        assert!(cap.cancel().is_none());
    }
}
