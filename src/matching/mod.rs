//! Pairing of source policies with reference candidates.
//!
//! Four selectable strategies, each returning at most one candidate per
//! source policy. ByName, ById, and CustomMapping are first-match-wins over
//! the reference set in input order; SemanticSimilarity picks the highest
//! score above its threshold, ties broken by lexicographic candidate id, so
//! results never depend on input ordering. A reference claimed by one match
//! is never offered to a later source policy.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::normalize::{string_set_eq, CanonicalPolicy};

/// Extension of configuration declaration files, used by the custom-mapping
/// locator rules.
const CONFIG_FILE_EXTENSION: &str = ".tf";

fn default_similarity_threshold() -> f64 {
    0.8
}

/// Strategy configuration as selected by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Equality on display name.
    ByName {
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Case-insensitive equality on the canonical id. Works across formats
    /// because configuration-derived policies carry deterministic derived ids.
    ById,
    /// Caller-supplied map from a source key (id or display name) to a
    /// reference locator string.
    CustomMapping { map: HashMap<String, String> },
    /// Composite score over state, included applications, included users,
    /// and client app types.
    SemanticSimilarity {
        #[serde(default = "default_similarity_threshold")]
        threshold: f64,
    },
}

impl Default for MatchStrategy {
    fn default() -> Self {
        MatchStrategy::ByName {
            case_insensitive: true,
        }
    }
}

/// Discriminant of [`MatchStrategy`], recorded on each outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ByName,
    ById,
    CustomMapping,
    SemanticSimilarity,
}

impl MatchStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            MatchStrategy::ByName { .. } => StrategyKind::ByName,
            MatchStrategy::ById => StrategyKind::ById,
            MatchStrategy::CustomMapping { .. } => StrategyKind::CustomMapping,
            MatchStrategy::SemanticSimilarity { .. } => StrategyKind::SemanticSimilarity,
        }
    }
}

/// Pairs source policies with reference candidates under one strategy.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    strategy: MatchStrategy,
}

impl Matcher {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Find the reference candidate for `source`, skipping already-claimed
    /// references. Returns an index into `references`.
    pub fn find_match(
        &self,
        source: &CanonicalPolicy,
        references: &[CanonicalPolicy],
        claimed: &HashSet<usize>,
    ) -> Option<usize> {
        match &self.strategy {
            MatchStrategy::ByName { case_insensitive } => {
                unclaimed(references, claimed).find_map(|(idx, candidate)| {
                    let equal = if *case_insensitive {
                        candidate
                            .display_name
                            .eq_ignore_ascii_case(&source.display_name)
                    } else {
                        candidate.display_name == source.display_name
                    };
                    equal.then_some(idx)
                })
            }
            MatchStrategy::ById => unclaimed(references, claimed).find_map(|(idx, candidate)| {
                candidate.id.eq_ignore_ascii_case(&source.id).then_some(idx)
            }),
            MatchStrategy::CustomMapping { map } => {
                let locator = map
                    .get(&source.id)
                    .or_else(|| map.get(&source.display_name))?;
                custom_mapping_match(locator, references, claimed)
            }
            MatchStrategy::SemanticSimilarity { threshold } => {
                similarity_match(source, references, claimed, *threshold)
            }
        }
    }
}

fn unclaimed<'a>(
    references: &'a [CanonicalPolicy],
    claimed: &'a HashSet<usize>,
) -> impl Iterator<Item = (usize, &'a CanonicalPolicy)> {
    references
        .iter()
        .enumerate()
        .filter(move |(idx, _)| !claimed.contains(idx))
}

/// Drop a trailing `.ext` when one is present; identifiers without an
/// extension come back unchanged.
fn strip_extension(s: &str) -> &str {
    match s.rfind('.') {
        Some(idx) if idx > 0 && !s[idx + 1..].is_empty() => {
            if s[idx + 1..].chars().all(|c| c.is_ascii_alphanumeric()) {
                &s[..idx]
            } else {
                s
            }
        }
        _ => s,
    }
}

/// Locator rules in precedence order; the first rule that matches any
/// unclaimed reference wins. The length guard on the final substring rule
/// keeps trivial short strings from matching everything.
fn custom_mapping_match(
    locator: &str,
    references: &[CanonicalPolicy],
    claimed: &HashSet<usize>,
) -> Option<usize> {
    let rules: [&dyn Fn(&str, &str) -> bool; 4] = [
        &|locator, ident| locator == ident || locator == strip_extension(ident),
        &|locator, ident| locator.ends_with(CONFIG_FILE_EXTENSION) && locator.contains(ident),
        &|locator, ident| {
            ident.ends_with(CONFIG_FILE_EXTENSION) && ident.contains(strip_extension(locator))
        },
        &|locator, ident| {
            locator.len() >= 3
                && ident.len() >= 3
                && (locator.contains(ident) || ident.contains(locator))
        },
    ];
    for rule in rules {
        for (idx, reference) in unclaimed(references, claimed) {
            if rule(locator, &reference.source_identifier) {
                return Some(idx);
            }
        }
    }
    None
}

/// Score over four equally-weighted signals: state equality plus three set
/// equalities, each counted only when present on both sides.
fn similarity_score(source: &CanonicalPolicy, candidate: &CanonicalPolicy) -> f64 {
    let mut compared = 1u32;
    let mut matched = u32::from(source.state == candidate.state);

    let set_signals = [
        (
            &source.conditions.applications.include,
            &candidate.conditions.applications.include,
        ),
        (
            &source.conditions.users.include_users,
            &candidate.conditions.users.include_users,
        ),
        (
            &source.conditions.client_app_types,
            &candidate.conditions.client_app_types,
        ),
    ];
    for (a, b) in set_signals {
        if !a.is_empty() && !b.is_empty() {
            compared += 1;
            matched += u32::from(string_set_eq(a, b));
        }
    }
    f64::from(matched) / f64::from(compared)
}

fn similarity_match(
    source: &CanonicalPolicy,
    references: &[CanonicalPolicy],
    claimed: &HashSet<usize>,
    threshold: f64,
) -> Option<usize> {
    let mut best: Option<(f64, &str, usize)> = None;
    for (idx, candidate) in unclaimed(references, claimed) {
        let score = similarity_score(source, candidate);
        if score <= threshold {
            continue;
        }
        let replace = match &best {
            None => true,
            // Highest score wins; ties break to the lexicographically
            // smallest candidate id.
            Some((best_score, best_id, _)) => {
                score > *best_score || (score == *best_score && candidate.id.as_str() < *best_id)
            }
        };
        if replace {
            best = Some((score, candidate.id.as_str(), idx));
        }
    }
    best.map(|(_, _, idx)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{derived_policy_id, PolicyState, SourceFormat};
    use serde_json::Value;

    fn policy(id: &str, name: &str, source_identifier: &str) -> CanonicalPolicy {
        CanonicalPolicy {
            id: id.to_string(),
            display_name: name.to_string(),
            state: PolicyState::Enabled,
            source_format: SourceFormat::Json,
            source_identifier: source_identifier.to_string(),
            conditions: Default::default(),
            grant_controls: None,
            session_controls: None,
            original_payload: Value::Null,
        }
    }

    #[test]
    fn by_name_respects_case_configuration() {
        let source = policy("1", "Require MFA", "export");
        let references = vec![policy("2", "require mfa", "Require MFA.json")];
        let claimed = HashSet::new();

        let strict = Matcher::new(MatchStrategy::ByName {
            case_insensitive: false,
        });
        assert_eq!(strict.find_match(&source, &references, &claimed), None);

        let lenient = Matcher::new(MatchStrategy::ByName {
            case_insensitive: true,
        });
        assert_eq!(lenient.find_match(&source, &references, &claimed), Some(0));
    }

    #[test]
    fn by_id_matches_across_formats_via_derived_id() {
        let derived = derived_policy_id("block_legacy_auth");
        let mut source = policy(&derived, "Block Legacy Auth", "block_legacy_auth");
        source.source_format = SourceFormat::Config;
        let references = vec![
            policy("unrelated", "Other", "other.json"),
            policy(&derived.to_uppercase(), "Block Legacy Auth", "baseline.json"),
        ];
        let matcher = Matcher::new(MatchStrategy::ById);
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            Some(1)
        );
    }

    #[test]
    fn custom_mapping_suffix_rule_matches_config_locator() {
        // Scenario: {"123": "ca_policy_block_legacy.tf"} matches a reference
        // whose identifier is "block_legacy".
        let source = policy("123", "Block Legacy Auth", "export");
        let references = vec![policy("9", "Block Legacy Auth", "block_legacy")];
        let map = HashMap::from([(
            "123".to_string(),
            "ca_policy_block_legacy.tf".to_string(),
        )]);
        let matcher = Matcher::new(MatchStrategy::CustomMapping { map });
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            Some(0)
        );
    }

    #[test]
    fn custom_mapping_exact_match_takes_precedence() {
        let source = policy("1", "P", "export");
        let references = vec![
            policy("a", "P", "block_legacy_extended"),
            policy("b", "P", "block_legacy"),
        ];
        let map = HashMap::from([("1".to_string(), "block_legacy".to_string())]);
        let matcher = Matcher::new(MatchStrategy::CustomMapping { map });
        // Rule 1 (exact) picks index 1 even though rule 4 would have matched
        // index 0 first.
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            Some(1)
        );
    }

    #[test]
    fn custom_mapping_short_strings_do_not_substring_match() {
        let source = policy("1", "P", "export");
        let references = vec![policy("a", "P", "ab")];
        let map = HashMap::from([("1".to_string(), "ab".to_string())]);
        let matcher = Matcher::new(MatchStrategy::CustomMapping { map });
        // "ab" still matches by exact equality (rule 1)...
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            Some(0)
        );
        // ...but a two-character locator never substring-matches.
        let map = HashMap::from([("1".to_string(), "xy".to_string())]);
        let matcher = Matcher::new(MatchStrategy::CustomMapping { map });
        let references = vec![policy("a", "P", "xyz")];
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            None
        );
    }

    #[test]
    fn similarity_requires_score_above_threshold() {
        let mut source = policy("s", "Source", "export");
        source.conditions.applications.include = vec!["All".to_string()];
        source.conditions.users.include_users = vec!["All".to_string()];

        let mut close = policy("c", "Close", "close.json");
        close.conditions.applications.include = vec!["All".to_string()];
        close.conditions.users.include_users = vec!["All".to_string()];

        let mut far = policy("f", "Far", "far.json");
        far.state = PolicyState::Disabled;
        far.conditions.applications.include = vec!["Office365".to_string()];
        far.conditions.users.include_users = vec!["Nobody".to_string()];

        let matcher = Matcher::new(MatchStrategy::SemanticSimilarity { threshold: 0.8 });
        let references = vec![far, close];
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            Some(1)
        );
    }

    #[test]
    fn similarity_ties_break_to_lexicographic_id() {
        let source = policy("s", "Source", "export");
        // Both candidates score identically (state-only comparison).
        let references = vec![policy("zeta", "B", "b.json"), policy("alpha", "A", "a.json")];
        let matcher = Matcher::new(MatchStrategy::SemanticSimilarity { threshold: 0.8 });
        assert_eq!(
            matcher.find_match(&source, &references, &HashSet::new()),
            Some(1)
        );
    }

    #[test]
    fn claimed_references_are_never_rematched() {
        let source = policy("1", "Same Name", "export");
        let references = vec![
            policy("a", "Same Name", "first.json"),
            policy("b", "Same Name", "second.json"),
        ];
        let matcher = Matcher::new(MatchStrategy::ByName {
            case_insensitive: true,
        });
        let mut claimed = HashSet::new();
        assert_eq!(matcher.find_match(&source, &references, &claimed), Some(0));
        claimed.insert(0);
        assert_eq!(matcher.find_match(&source, &references, &claimed), Some(1));
    }
}
