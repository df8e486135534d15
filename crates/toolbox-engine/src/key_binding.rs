//! Key events as delivered by the host and matching against bound keys.

use std::str::FromStr;

use config::normalize_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Modifier keys held during a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    /// Control.
    pub ctrl: bool,
    /// Alt or Option.
    pub alt: bool,
    /// Command, Windows or Super.
    pub meta: bool,
    /// Shift.
    pub shift: bool,
}

impl Modifiers {
    /// Alt alone.
    pub const ALT: Self = Self {
        ctrl: false,
        alt: true,
        meta: false,
        shift: false,
    };

    /// True when a modifier that suppresses module dispatch is held.
    ///
    /// Shift only changes the produced character and does not count.
    pub fn any_command(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }

    /// Set the flag named `name`. Returns false for an unknown name.
    fn set(&mut self, name: &str) -> bool {
        match name {
            "ctrl" | "control" => self.ctrl = true,
            "alt" | "option" => self.alt = true,
            "meta" | "cmd" | "command" | "super" => self.meta = true,
            "shift" => self.shift = true,
            _ => return false,
        }
        true
    }
}

/// A single key press: the key name plus held modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Key name as reported by the host (`"q"`, `"Q"`, `"Escape"`, `" "`).
    pub key: String,
    /// Modifiers held with the key.
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// A key press without modifiers.
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            modifiers: Modifiers::default(),
        }
    }

    /// A key press with `modifiers` held.
    pub fn with_modifiers(key: &str, modifiers: Modifiers) -> Self {
        Self {
            key: key.to_string(),
            modifiers,
        }
    }

    /// Normalized key name, comparable with stored bindings.
    pub fn normalized(&self) -> String {
        normalize_key(&self.key)
    }

    /// Case-insensitive comparison with a bound key.
    pub fn matches(&self, binding: &str) -> bool {
        self.normalized() == normalize_key(binding)
    }
}

/// Failure to parse a chord like `alt+t`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid key chord {0:?}")]
pub struct ParseKeyError(pub String);

impl FromStr for KeyEvent {
    type Err = ParseKeyError;

    /// Parse `mod+mod+key`, e.g. `alt+t` or `q`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let Some((key, mods)) = parts.split_last() else {
            return Err(ParseKeyError(s.to_string()));
        };
        if key.is_empty() {
            return Err(ParseKeyError(s.to_string()));
        }
        let mut modifiers = Modifiers::default();
        for m in mods {
            if !modifiers.set(&m.to_ascii_lowercase()) {
                return Err(ParseKeyError(s.to_string()));
            }
        }
        Ok(Self::with_modifiers(key, modifiers))
    }
}
