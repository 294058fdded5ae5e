//! Rule selection - picks the single winning rule for a page

use tracing::{debug, trace};

use super::{Policy, Rule, matcher};
use crate::settings::GlobalSettings;

/// The winning rule and its position in the stored list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected<'a> {
    pub index: usize,
    pub rule: &'a Rule,
}

/// Select the rule that applies to `url`.
///
/// `rules` holds the stored list by position, with `None` for entries that
/// could not be decoded; those never match. Only enabled rules are
/// considered; automatic runs additionally require `autoExecute`. Among the
/// matching rules the highest priority wins and ties go to the rule that
/// comes first in the list.
pub fn select<'a>(
    rules: &'a [Option<Rule>],
    url: &str,
    is_manual: bool,
    settings: &GlobalSettings,
    policy: &Policy,
) -> Option<Selected<'a>> {
    if !settings.extension_enabled && !(is_manual && policy.manual_bypasses_disabled) {
        debug!("Extension disabled, skipping rules for {}", url);
        return None;
    }

    if !is_manual && policy.auto_bookmark_gates_selection && !settings.auto_bookmark {
        debug!("Auto-bookmark disabled, skipping automatic run for {}", url);
        return None;
    }

    rules
        .iter()
        .enumerate()
        .filter_map(|(index, rule)| Some((index, rule.as_ref()?)))
        .filter(|(index, rule)| {
            if !rule.enabled {
                trace!("Skipping disabled rule {}: {}", index + 1, rule);
                return false;
            }
            if !is_manual && !rule.auto_execute {
                trace!("Skipping manual-only rule {}: {}", index + 1, rule);
                return false;
            }
            matcher::matches(rule, url, policy)
        })
        .map(|(index, rule)| Selected { index, rule })
        .reduce(|best, candidate| {
            if candidate.rule.priority > best.rule.priority {
                candidate
            } else {
                best
            }
        })
        .inspect(|winner| {
            debug!(
                "Rule {} ({}) selected for {} with priority {}",
                winner.index + 1,
                winner.rule,
                url,
                winner.rule.priority
            );
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/article/7";

    fn rule(domain: &str, priority: u8) -> Rule {
        Rule {
            priority,
            ..Rule::for_domain(domain)
        }
    }

    fn settings() -> GlobalSettings {
        GlobalSettings::default()
    }

    fn stored(rules: &[Rule]) -> Vec<Option<Rule>> {
        rules.iter().cloned().map(Some).collect()
    }

    #[test]
    fn test_highest_priority_wins() {
        let rules = stored(&[rule("example.com", 10), rule("example.com", 90)]);
        let winner = select(&rules, URL, false, &settings(), &Policy::CANONICAL).unwrap();
        assert_eq!(winner.index, 1);
    }

    #[test]
    fn test_priority_tie_goes_to_first_in_list() {
        let rules = stored(&[
            Rule {
                bookmark_location: Some("A".to_string()),
                ..rule("example.com", 50)
            },
            Rule {
                bookmark_location: Some("B".to_string()),
                ..rule("example.com", 50)
            },
        ]);

        for _ in 0..10 {
            let winner = select(&rules, URL, false, &settings(), &Policy::CANONICAL).unwrap();
            assert_eq!(winner.index, 0);
            assert_eq!(winner.rule.bookmark_location.as_deref(), Some("A"));
        }
    }

    #[test]
    fn test_disabled_rules_skipped_even_when_manual() {
        let rules = stored(&[Rule {
            enabled: false,
            ..rule("example.com", 100)
        }]);

        assert!(select(&rules, URL, false, &settings(), &Policy::CANONICAL).is_none());
        assert!(select(&rules, URL, true, &settings(), &Policy::CANONICAL).is_none());
    }

    #[test]
    fn test_manual_only_rules_need_manual_trigger() {
        let rules = stored(&[Rule {
            auto_execute: false,
            ..rule("example.com", 0)
        }]);

        assert!(select(&rules, URL, false, &settings(), &Policy::CANONICAL).is_none());
        assert!(select(&rules, URL, true, &settings(), &Policy::CANONICAL).is_some());
    }

    #[test]
    fn test_extension_disabled() {
        let rules = stored(&[rule("example.com", 0)]);
        let disabled = GlobalSettings {
            extension_enabled: false,
            ..settings()
        };

        assert!(select(&rules, URL, false, &disabled, &Policy::CANONICAL).is_none());
        assert!(select(&rules, URL, true, &disabled, &Policy::CANONICAL).is_some());

        let strict = Policy {
            manual_bypasses_disabled: false,
            ..Policy::CANONICAL
        };
        assert!(select(&rules, URL, true, &disabled, &strict).is_none());
    }

    #[test]
    fn test_auto_bookmark_gate_variant() {
        let rules = stored(&[rule("example.com", 0)]);
        let no_bookmark = GlobalSettings {
            auto_bookmark: false,
            ..settings()
        };

        assert!(select(&rules, URL, false, &no_bookmark, &Policy::CANONICAL).is_some());

        let gated = Policy {
            auto_bookmark_gates_selection: true,
            ..Policy::CANONICAL
        };
        assert!(select(&rules, URL, false, &no_bookmark, &gated).is_none());
        assert!(select(&rules, URL, true, &no_bookmark, &gated).is_some());
    }

    #[test]
    fn test_no_matching_rule() {
        let rules = stored(&[rule("other.com", 100)]);
        assert!(select(&rules, URL, true, &settings(), &Policy::CANONICAL).is_none());
        assert!(select(&[], URL, true, &settings(), &Policy::CANONICAL).is_none());
    }

    #[test]
    fn test_undecodable_entry_keeps_positions() {
        let rules = vec![None, Some(rule("example.com", 10)), None];
        let winner = select(&rules, URL, false, &settings(), &Policy::CANONICAL).unwrap();
        assert_eq!(winner.index, 1);
    }
}
