//! Behavior switches for matching and execution
//!
//! Earlier releases disagreed on several details (exact vs. suffix domains,
//! AND vs. OR when both patterns are set, what a manual trigger may
//! override, how often a busy tab is retried). Each of those points is a
//! named field here so a config file or a test can pin it.

use serde::{Deserialize, Serialize};

/// How a rule's domain is compared with the page hostname
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainMatch {
    /// Normalized hostname must equal the normalized rule domain
    Exact,
    /// Subdomains of the rule domain match as well
    Suffix,
}

/// How `domain` and `contains` combine when both are set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    /// Every populated pattern must match
    All,
    /// Any populated pattern may match
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub domain_match: DomainMatch,

    pub combine: Combine,

    /// Manual triggers still run while the extension toggle is off
    pub manual_bypasses_disabled: bool,

    /// Manual triggers bookmark even when auto-bookmark is off
    pub manual_forces_bookmark: bool,

    /// Manual triggers close the tab even when auto-close is off
    pub manual_forces_close: bool,

    /// Automatic runs only select rules while auto-bookmark is on
    pub auto_bookmark_gates_selection: bool,

    /// Re-attempts after a busy tab-close failure
    pub close_retry_limit: u32,
}

impl Policy {
    pub const CANONICAL: Policy = Policy {
        domain_match: DomainMatch::Exact,
        combine: Combine::All,
        manual_bypasses_disabled: true,
        manual_forces_bookmark: true,
        manual_forces_close: false,
        auto_bookmark_gates_selection: false,
        close_retry_limit: 1,
    };
}

impl Default for Policy {
    fn default() -> Self {
        Self::CANONICAL
    }
}
