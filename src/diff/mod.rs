//! Structural diffing of JSON-like trees.
//!
//! The raw diff produces a patch tree in which every differing leaf is an
//! ordered `[before, after]` pair and unchanged subtrees are omitted
//! entirely. Whether a patch is "empty" is decided semantically: a leaf pair
//! counts as unchanged when the two values are equal, or when both are
//! date-like strings naming the same calendar date. That absorbs formatting
//! noise such as a trailing `.000Z` without suppressing genuine date changes.

pub mod canonical;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Compute the patch tree between two JSON trees. Equal trees produce an
/// empty object; a differing non-object root produces a single
/// `[before, after]` pair.
pub fn diff_trees(before: &Value, after: &Value) -> Value {
    diff_node(before, after).unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

fn diff_node(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }
    if let (Value::Object(a), Value::Object(b)) = (before, after) {
        let mut patch = serde_json::Map::new();
        for key in a.keys().chain(b.keys().filter(|k| !a.contains_key(*k))) {
            let left = a.get(key).unwrap_or(&Value::Null);
            let right = b.get(key).unwrap_or(&Value::Null);
            if let Some(child) = diff_node(left, right) {
                patch.insert(key.clone(), child);
            }
        }
        if patch.is_empty() {
            return None;
        }
        return Some(Value::Object(patch));
    }
    // Arrays and scalars are leaves: any difference is recorded whole.
    Some(Value::Array(vec![before.clone(), after.clone()]))
}

/// Recursively confirm every leaf pair in a patch tree is semantically
/// equivalent. Any leaf that is not a two-element array, or any non-object
/// non-pair value, is a real change; the check short-circuits on the first.
pub fn is_empty_diff(patch: &Value) -> bool {
    match patch {
        Value::Object(map) => map.values().all(is_empty_diff),
        Value::Array(pair) if pair.len() == 2 => semantically_equivalent(&pair[0], &pair[1]),
        _ => false,
    }
}

/// Render the non-equivalent leaf pairs of a patch tree as readable
/// difference strings, one per drifted leaf.
pub fn non_equivalent_leaves(patch: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_leaves(patch, String::new(), &mut out);
    out
}

fn collect_leaves(patch: &Value, path: String, out: &mut Vec<String>) {
    match patch {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                collect_leaves(child, child_path, out);
            }
        }
        Value::Array(pair) if pair.len() == 2 => {
            if !semantically_equivalent(&pair[0], &pair[1]) {
                out.push(format!("{}: {} -> {}", path, pair[0], pair[1]));
            }
        }
        other => out.push(format!("{}: unexpected patch node {}", path, other)),
    }
}

/// Semantic leaf equality: direct equality, or two date-like strings naming
/// the same calendar date regardless of time-of-day and textual format.
pub fn semantically_equivalent(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if let (Value::String(a), Value::String(b)) = (a, b) {
        if is_date_like(a) && is_date_like(b) {
            if let (Some(a), Some(b)) = (parse_calendar_date(a), parse_calendar_date(b)) {
                return a == b;
            }
        }
    }
    false
}

/// Heuristic for date-like strings: plausible length, at least one digit,
/// and a date separator character.
fn is_date_like(s: &str) -> bool {
    (8..=30).contains(&s.len())
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| matches!(c, '-' | '/' | '.'))
}

fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn identical_trees_diff_to_empty_patch() {
        let doc = json!({ "DisplayName": "Require MFA", "State": "enabled" });
        let patch = diff_trees(&doc, &doc);
        assert_eq!(patch, json!({}));
        assert!(is_empty_diff(&patch));
    }

    #[test]
    fn reserialized_copy_diffs_empty() {
        let doc = json!({
            "DisplayName": "Require MFA",
            "Conditions": { "Users": { "IncludeUsers": ["All"] } }
        });
        let copy: Value = serde_json::from_str(&doc.to_string()).unwrap();
        assert!(is_empty_diff(&diff_trees(&doc, &copy)));
    }

    #[test]
    fn differing_leaves_become_before_after_pairs() {
        let before = json!({ "State": "enabled", "DisplayName": "A" });
        let after = json!({ "State": "disabled", "DisplayName": "A" });
        let patch = diff_trees(&before, &after);
        assert_eq!(patch, json!({ "State": ["enabled", "disabled"] }));
        assert!(!is_empty_diff(&patch));
        let leaves = non_equivalent_leaves(&patch);
        assert_eq!(leaves, vec![r#"State: "enabled" -> "disabled""#]);
    }

    #[test]
    fn unchanged_subtrees_are_omitted() {
        let before = json!({
            "Keep": { "A": 1, "B": [1, 2] },
            "Change": { "X": "old" }
        });
        let after = json!({
            "Keep": { "A": 1, "B": [1, 2] },
            "Change": { "X": "new" }
        });
        let patch = diff_trees(&before, &after);
        assert_eq!(patch, json!({ "Change": { "X": ["old", "new"] } }));
    }

    #[test]
    fn keys_present_on_one_side_pair_with_null() {
        let before = json!({ "A": 1 });
        let after = json!({ "A": 1, "B": "added" });
        let patch = diff_trees(&before, &after);
        assert_eq!(patch, json!({ "B": [null, "added"] }));
    }

    #[test]
    fn date_format_noise_is_absorbed() {
        // Scenario: trailing .000Z must not register as drift.
        let before = json!({ "CreatedDateTime": "2024-01-01T00:00:00Z" });
        let after = json!({ "CreatedDateTime": "2024-01-01T00:00:00.000Z" });
        let patch = diff_trees(&before, &after);
        assert!(!patch.as_object().unwrap().is_empty(), "values do differ textually");
        assert!(is_empty_diff(&patch));
        assert!(non_equivalent_leaves(&patch).is_empty());
    }

    #[test]
    fn genuine_date_changes_still_surface() {
        let before = json!({ "CreatedDateTime": "2024-01-01T00:00:00Z" });
        let after = json!({ "CreatedDateTime": "2024-01-02T00:00:00Z" });
        assert!(!is_empty_diff(&diff_trees(&before, &after)));
    }

    #[test]
    fn time_of_day_differences_within_a_day_are_equivalent() {
        assert!(semantically_equivalent(
            &json!("2024-03-05T08:00:00Z"),
            &json!("2024-03-05 23:59:59")
        ));
    }

    #[test]
    fn non_date_strings_are_not_equivalent() {
        assert!(!semantically_equivalent(
            &json!("192.168.1.100"),
            &json!("192.168.1.101")
        ));
    }

    #[test]
    fn array_changes_are_whole_leaf_pairs() {
        let before = json!({ "Controls": ["mfa"] });
        let after = json!({ "Controls": ["mfa", "block"] });
        let patch = diff_trees(&before, &after);
        assert_eq!(patch, json!({ "Controls": [["mfa"], ["mfa", "block"]] }));
        assert!(!is_empty_diff(&patch));
    }

    #[test]
    fn malformed_patch_nodes_are_real_changes() {
        assert!(!is_empty_diff(&json!("stray leaf")));
        assert!(!is_empty_diff(&json!([1, 2, 3])));
    }
}
