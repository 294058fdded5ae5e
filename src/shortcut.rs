//! Custom keyboard shortcut matching
//!
//! Shortcuts are stored as `+`-joined tokens such as `Ctrl+Shift+B`. Key
//! events arrive from a page listener through the host relay.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Key event as reported by a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub alt_key: bool,
    #[serde(default)]
    pub shift_key: bool,
    #[serde(default)]
    pub meta_key: bool,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutError {
    #[error("shortcut is empty")]
    Empty,

    #[error("shortcut has more than one non-modifier key: {0}")]
    MultipleKeys(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shortcut {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    /// Upper-cased key, if any
    pub key: Option<String>,
}

impl Shortcut {
    /// Every listed modifier must be held and the key must match,
    /// ignoring case. Extra modifiers do not prevent a match.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        (!self.ctrl || event.ctrl_key)
            && (!self.alt || event.alt_key)
            && (!self.shift || event.shift_key)
            && (!self.meta || event.meta_key)
            && self
                .key
                .as_deref()
                .is_none_or(|key| event.key.to_uppercase() == key)
    }
}

impl FromStr for Shortcut {
    type Err = ShortcutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut shortcut = Shortcut::default();
        let mut any = false;

        for token in s.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            any = true;
            match token {
                "Ctrl" => shortcut.ctrl = true,
                "Alt" => shortcut.alt = true,
                "Shift" => shortcut.shift = true,
                "Meta" => shortcut.meta = true,
                key if shortcut.key.is_none() => shortcut.key = Some(key.to_uppercase()),
                _ => return Err(ShortcutError::MultipleKeys(s.to_string())),
            }
        }

        if any {
            Ok(shortcut)
        } else {
            Err(ShortcutError::Empty)
        }
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.meta {
            parts.push("Meta");
        }
        if let Some(key) = &self.key {
            parts.push(key);
        }
        write!(f, "{}", parts.join("+"))
    }
}
