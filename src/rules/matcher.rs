//! URL matching - decides whether a rule applies to a navigated page

use regex::Regex;
use std::sync::LazyLock;
use tracing::{trace, warn};
use url::Url;

use super::{Combine, DomainMatch, Policy, Rule};

static SCHEME_AND_WWW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?://)?(?:www\.)?").expect("invalid domain regex"));

/// Strip an optional `http(s)://`, a leading `www.` and one trailing `/`
pub fn normalize_rule_domain(domain: &str) -> String {
    let stripped = SCHEME_AND_WWW.replace(domain.trim(), "");
    stripped
        .strip_suffix('/')
        .unwrap_or(&stripped)
        .to_string()
}

/// Strip a leading `www.` from a page hostname
pub fn normalize_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Check whether `rule` applies to `url`.
///
/// An unparseable URL never matches. A rule with neither a domain nor a
/// substring never matches.
pub fn matches(rule: &Rule, url: &str, policy: &Policy) -> bool {
    if !rule.has_pattern() {
        return false;
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Invalid URL {:?}: {}", url, e);
            return false;
        }
    };

    let domain_match = rule
        .domain
        .as_deref()
        .map(|domain| check_domain(&parsed, domain, policy.domain_match));
    let contains_match = rule.contains.as_deref().map(|needle| url.contains(needle));

    let matched = match policy.combine {
        Combine::All => domain_match.unwrap_or(true) && contains_match.unwrap_or(true),
        Combine::Any => domain_match.unwrap_or(false) || contains_match.unwrap_or(false),
    };

    trace!(
        "Rule {} vs {}: domain={:?} contains={:?} -> {}",
        rule, url, domain_match, contains_match, matched
    );
    matched
}

fn check_domain(url: &Url, domain: &str, mode: DomainMatch) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = normalize_host(host);
    let domain = normalize_rule_domain(domain);

    match mode {
        DomainMatch::Exact => host.eq_ignore_ascii_case(&domain),
        DomainMatch::Suffix => {
            host.eq_ignore_ascii_case(&domain)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
        }
    }
}
