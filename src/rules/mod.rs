//! Rule engine - matching rules and the bookmark actions they trigger

mod engine;
mod matcher;
mod policy;
mod selector;

pub use engine::{Applied, Execution, RuleEngine, TriggerError};
pub use matcher::{matches, normalize_host, normalize_rule_domain};
pub use policy::{Combine, DomainMatch, Policy};
pub use selector::{Selected, select};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Highest priority a rule can carry
pub const MAX_PRIORITY: u8 = 100;

/// What to do with existing bookmarks for the page when a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookmarkAction {
    /// Create a bookmark only if the URL is not bookmarked yet
    #[default]
    DoNothing,

    /// Update the first existing bookmark in place and move it to the rule's folder
    Replace,

    /// Always add another bookmark
    Duplicate,
}

impl BookmarkAction {
    /// Label shown to users in change summaries
    pub fn label(self) -> &'static str {
        match self {
            BookmarkAction::DoNothing => "Do Nothing if Bookmarked",
            BookmarkAction::Replace => "Replace Bookmark",
            BookmarkAction::Duplicate => "Add Duplicate Bookmark",
        }
    }
}

impl std::str::FromStr for BookmarkAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doNothing" | "do-nothing" | "nothing" => Ok(BookmarkAction::DoNothing),
            "replace" => Ok(BookmarkAction::Replace),
            "duplicate" => Ok(BookmarkAction::Duplicate),
            other => Err(format!(
                "unknown bookmark action '{}' (expected doNothing, replace or duplicate)",
                other
            )),
        }
    }
}

/// A rule that matches navigated pages and bookmarks them.
///
/// Field names follow the persisted camelCase layout so the rule list
/// round-trips through storage and backups unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Hostname pattern; scheme, `www.` and a trailing slash are ignored
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        serialize_with = "none_as_empty"
    )]
    pub domain: Option<String>,

    /// Literal, case-sensitive substring of the full URL
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        serialize_with = "none_as_empty"
    )]
    pub contains: Option<String>,

    /// 0-100, higher wins
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: u8,

    /// Target bookmark folder id
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub bookmark_location: Option<String>,

    #[serde(default)]
    pub bookmark_action: BookmarkAction,

    /// Whether the rule is active
    #[serde(default)]
    pub enabled: bool,

    /// Whether the rule fires on page loads, not only on manual triggers
    #[serde(default)]
    pub auto_execute: bool,

    /// Close the tab after bookmarking (requires the global auto-close toggle)
    #[serde(default)]
    pub close_tab: bool,
}

impl Rule {
    /// Create an enabled, automatic rule for a domain
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            enabled: true,
            auto_execute: true,
            ..Default::default()
        }
    }

    /// Create an enabled, automatic rule for a URL substring
    pub fn for_substring(contains: impl Into<String>) -> Self {
        Self {
            contains: Some(contains.into()),
            enabled: true,
            auto_execute: true,
            ..Default::default()
        }
    }

    /// True when at least one of `domain` / `contains` is set
    pub fn has_pattern(&self) -> bool {
        self.domain.is_some() || self.contains.is_some()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.domain, &self.contains) {
            (Some(d), Some(c)) => write!(f, "{} ∧ \"{}\"", d, c),
            (Some(d), None) => write!(f, "{}", d),
            (None, Some(c)) => write!(f, "\"{}\"", c),
            (None, None) => write!(f, "(empty rule)"),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn none_as_empty<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

/// Priorities were historically saved from a text input, so accept numbers
/// and numeric strings alike. Out-of-range values are clamped; anything
/// else reads as 0.
fn lenient_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let raw = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, f64::from(MAX_PRIORITY)) as u8)
        .unwrap_or(0))
}
