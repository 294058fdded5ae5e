//! Host protocol between the browser side and the daemon
//!
//! Messages are JSON objects, one per line, tagged by `type`. Requests may
//! carry an `id` which is echoed on the matching reply. Outbound messages
//! (close requests, options broadcasts) are sent unprompted.

mod dispatch;

pub use dispatch::Dispatcher;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shortcut::KeyEvent;
use crate::tabs::{Tab, TabId, TabStatus};

/// Command name that runs rules for the focused tab
pub const APPLY_RULES_COMMAND: &str = "apply-rules";

/// A request with its optional correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub message: Message,
}

/// Messages from the browser side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A tab changed; rules run when `status` is complete
    TabUpdated {
        tab: Tab,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<TabStatus>,
    },

    /// A tab gained focus
    TabActivated { tab_id: TabId },

    /// The browser closed a tab, including one the daemon asked to close
    TabRemoved { tab_id: TabId },

    /// The browser refused a `close_tab` request; `error` is its message
    TabCloseFailed { tab_id: TabId, error: String },

    /// The user pressed the "execute" button
    ManualExecute,

    /// A registered browser command fired
    Command { name: String },

    /// A page reports a key press to test against the custom shortcut
    CheckShortcut { event: KeyEvent },

    /// A page saw the custom shortcut; run rules for the focused tab
    CustomShortcut,

    /// The options page saved something
    OptionsChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },

    /// Ask how many option changes have been seen
    GetOptionsVersion,

    /// The bookmark tree was edited outside the daemon
    BookmarksChanged,
}

/// Reply to a [`Message`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Outcome of a rule run
    Executed {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Shortcut { matches_shortcut: bool },

    OptionsVersion { version: u64 },

    Ok,

    Error { message: String },
}

/// A reply frame with the request id echoed back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub response: Response,
}

/// Requests from the daemon to the browser side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Close a tab a rule asked to close. The browser answers with
    /// `tab_removed` or `tab_close_failed`.
    CloseTab { tab_id: TabId },

    /// Forward an options change to open pages
    OptionsChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

/// Parse one protocol line
pub fn decode(line: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabs::TabError;
    use serde_json::json;

    #[test]
    fn test_decode_tab_updated() {
        let envelope = decode(
            r#"{"id": 7, "type": "tab_updated", "status": "complete",
                "tab": {"id": 3, "url": "https://example.com/", "title": "Example"}}"#,
        )
        .unwrap();

        assert_eq!(envelope.id, Some(7));
        assert_eq!(
            envelope.message,
            Message::TabUpdated {
                tab: Tab::new(3, "https://example.com/", "Example"),
                status: Some(TabStatus::Complete),
            }
        );
    }

    #[test]
    fn test_decode_unit_messages_without_id() {
        let envelope = decode(r#"{"type": "manual_execute"}"#).unwrap();
        assert_eq!(envelope.id, None);
        assert_eq!(envelope.message, Message::ManualExecute);

        let envelope = decode(r#"{"type": "options_changed"}"#).unwrap();
        assert_eq!(
            envelope.message,
            Message::OptionsChanged {
                key: None,
                value: None
            }
        );
    }

    #[test]
    fn test_decode_check_shortcut() {
        let envelope = decode(
            r#"{"type": "check_shortcut", "event": {"ctrlKey": true, "shiftKey": true, "key": "b"}}"#,
        )
        .unwrap();
        let Message::CheckShortcut { event } = envelope.message else {
            panic!("expected check_shortcut");
        };
        assert!(event.ctrl_key && event.shift_key && !event.alt_key);
        assert_eq!(event.key, "b");
    }

    #[test]
    fn test_decode_tab_close_failed() {
        let envelope = decode(
            r#"{"type": "tab_close_failed", "tab_id": 4, "error": "Tabs cannot be edited right now (user may be dragging a tab)."}"#,
        )
        .unwrap();
        let Message::TabCloseFailed { tab_id, error } = envelope.message else {
            panic!("expected tab_close_failed");
        };
        assert_eq!(tab_id, 4);
        assert_eq!(TabError::from_message(error), TabError::Busy);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(decode(r#"{"type": "reboot"}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = Reply {
            id: Some(2),
            response: Response::Executed {
                success: false,
                error: Some("No active tab found".into()),
            },
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"id": 2, "type": "executed", "success": false, "error": "No active tab found"})
        );

        let reply = Reply {
            id: None,
            response: Response::Ok,
        };
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"type":"ok"}"#);
    }

    #[test]
    fn test_outbound_wire_format() {
        assert_eq!(
            serde_json::to_string(&Outbound::CloseTab { tab_id: 9 }).unwrap(),
            r#"{"type":"close_tab","tab_id":9}"#
        );
    }
}
