//! Attribute extraction from block bodies.
//!
//! Works on the raw text between a block's braces: quoted scalar strings,
//! unquoted scalar tokens (numbers, booleans, bare references like
//! `var.admins`), bracketed string arrays, and named sub-blocks located with
//! the same brace-depth technique the block extractor uses. A missing
//! attribute is `None`, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::blocks::body_by_brace_depth;
use super::{
    ConfigApplications, ConfigConditions, ConfigGrantControls, ConfigLocal, ConfigLocations,
    ConfigPlatforms, ConfigPolicy, ConfigUsers, ConfigVariable, RawBlock, RawValue,
};

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|([A-Za-z0-9_.\-]+)"#).unwrap());
static LOCAL_ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([A-Za-z0-9_]+)\s*=\s*(.+?)\s*$").unwrap());

fn quoted_pattern(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?m)^\s*{}\s*=\s*"([^"]*)""#,
        regex::escape(name)
    ))
    .unwrap()
}

fn bare_pattern(name: &str) -> Regex {
    Regex::new(&format!(
        r"(?m)^\s*{}\s*=\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)",
        regex::escape(name)
    ))
    .unwrap()
}

fn list_pattern(name: &str) -> Regex {
    Regex::new(&format!(
        r"(?m)^\s*{}\s*=\s*\[([^\]]*)\]",
        regex::escape(name)
    ))
    .unwrap()
}

fn block_pattern(name: &str) -> Regex {
    Regex::new(&format!(r"(?m)^\s*{}\s*\{{", regex::escape(name))).unwrap()
}

/// Scalar attribute: a quoted string, or failing that a bare token
/// (`true`, `30`, `var.policy_state`).
pub fn scalar(body: &str, name: &str) -> Option<String> {
    if let Some(captures) = quoted_pattern(name).captures(body) {
        return Some(captures[1].to_string());
    }
    bare_pattern(name)
        .captures(body)
        .map(|captures| captures[1].to_string())
}

/// Bracketed string-array attribute. Items may be quoted strings or bare
/// reference tokens.
pub fn string_items(body: &str, name: &str) -> Option<Vec<String>> {
    let captures = list_pattern(name).captures(body)?;
    let inner = captures[1].to_string();
    let mut items = Vec::new();
    for item in LIST_ITEM.captures_iter(&inner) {
        if let Some(quoted) = item.get(1) {
            items.push(quoted.as_str().to_string());
        } else if let Some(bare) = item.get(2) {
            items.push(bare.as_str().to_string());
        }
    }
    Some(items)
}

/// List-or-scalar attribute: a bracketed array when present, otherwise a
/// scalar token (which may be an unresolved reference to a list).
pub fn value(body: &str, name: &str) -> Option<RawValue> {
    if let Some(items) = string_items(body, name) {
        return Some(RawValue::List(items));
    }
    scalar(body, name).map(RawValue::Scalar)
}

/// Named sub-block body, scoped to the parent body by brace depth.
pub fn sub_block(body: &str, name: &str) -> Option<String> {
    let header = block_pattern(name).find(body)?;
    body_by_brace_depth(body, header.end() - 1)
}

fn scalar_to_json(token: &str, quoted: bool) -> Value {
    if !quoted {
        if let Ok(parsed) = token.parse::<bool>() {
            return Value::Bool(parsed);
        }
        if let Ok(parsed) = token.parse::<i64>() {
            return Value::Number(parsed.into());
        }
    }
    Value::String(token.to_string())
}

/// Session control attributes kept as a loose JSON object; the diff engine
/// treats session controls as an opaque subtree.
const SESSION_CONTROL_ATTRS: &[&str] = &[
    "application_enforced_restrictions_enabled",
    "cloud_app_security_policy",
    "disable_resilience_defaults",
    "persistent_browser_mode",
    "sign_in_frequency",
    "sign_in_frequency_period",
];

fn session_controls(body: &str) -> Option<Value> {
    let block = sub_block(body, "session_controls")?;
    let mut map = serde_json::Map::new();
    for name in SESSION_CONTROL_ATTRS {
        if let Some(captures) = quoted_pattern(name).captures(&block) {
            map.insert(name.to_string(), scalar_to_json(&captures[1], true));
        } else if let Some(captures) = bare_pattern(name).captures(&block) {
            map.insert(name.to_string(), scalar_to_json(&captures[1], false));
        }
    }
    Some(Value::Object(map))
}

fn conditions(body: &str) -> Option<ConfigConditions> {
    let block = sub_block(body, "conditions")?;
    let applications = sub_block(&block, "applications").map(|b| ConfigApplications {
        included_applications: value(&b, "included_applications"),
        excluded_applications: value(&b, "excluded_applications"),
        included_user_actions: value(&b, "included_user_actions"),
    });
    let users = sub_block(&block, "users").map(|b| ConfigUsers {
        included_users: value(&b, "included_users"),
        excluded_users: value(&b, "excluded_users"),
        included_groups: value(&b, "included_groups"),
        excluded_groups: value(&b, "excluded_groups"),
        included_roles: value(&b, "included_roles"),
        excluded_roles: value(&b, "excluded_roles"),
    });
    let platforms = sub_block(&block, "platforms").map(|b| ConfigPlatforms {
        included_platforms: value(&b, "included_platforms"),
        excluded_platforms: value(&b, "excluded_platforms"),
    });
    let locations = sub_block(&block, "locations").map(|b| ConfigLocations {
        included_locations: value(&b, "included_locations"),
        excluded_locations: value(&b, "excluded_locations"),
    });
    Some(ConfigConditions {
        client_app_types: value(&block, "client_app_types"),
        sign_in_risk_levels: value(&block, "sign_in_risk_levels"),
        user_risk_levels: value(&block, "user_risk_levels"),
        applications,
        users,
        platforms,
        locations,
    })
}

fn grant_controls(body: &str) -> Option<ConfigGrantControls> {
    let block = sub_block(body, "grant_controls")?;
    Some(ConfigGrantControls {
        operator: scalar(&block, "operator"),
        built_in_controls: value(&block, "built_in_controls"),
        custom_authentication_factors: value(&block, "custom_authentication_factors"),
        terms_of_use: value(&block, "terms_of_use"),
    })
}

/// Read a full policy out of an extracted resource block.
pub fn policy_from_block(block: &RawBlock) -> ConfigPolicy {
    let body = block.body_text.as_str();
    ConfigPolicy {
        declaration_name: block.declared_name.clone(),
        display_name: scalar(body, "display_name"),
        state: scalar(body, "state"),
        conditions: conditions(body),
        grant_controls: grant_controls(body),
        session_controls: session_controls(body),
    }
}

/// Read a `variable` declaration: optional type expression plus default.
pub fn variable_from_block(block: &RawBlock) -> ConfigVariable {
    let body = block.body_text.as_str();
    // Type expressions like `list(string)` fall outside the bare-token
    // pattern, so they get their own capture.
    static TYPE_EXPR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*type\s*=\s*([A-Za-z0-9_()\[\], ]+?)\s*$").unwrap());
    let declared_type = TYPE_EXPR
        .captures(body)
        .map(|captures| captures[1].to_string());
    ConfigVariable {
        name: block.declared_name.clone(),
        declared_type,
        default_value: value(body, "default"),
    }
}

/// Split a `locals` block into its assignments. Values are kept as raw text
/// up to the end of the line; nested structures are not interpreted.
pub fn locals_from_block(block: &RawBlock) -> Vec<ConfigLocal> {
    LOCAL_ASSIGNMENT
        .captures_iter(&block.body_text)
        .map(|captures| ConfigLocal {
            name: captures[1].to_string(),
            raw_value_text: captures[2].to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{extract_blocks, BlockKind};

    fn policy_block(text: &str) -> RawBlock {
        let (mut blocks, diags) = extract_blocks(
            text,
            BlockKind::Resource("azuread_conditional_access_policy"),
            "test.tf",
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        assert_eq!(blocks.len(), 1);
        blocks.remove(0)
    }

    #[test]
    fn reads_scalar_state_and_grant_controls_verbatim() {
        // Scenario: the three leaf values come out exactly as written.
        let block = policy_block(
            r#"
resource "azuread_conditional_access_policy" "require_mfa" {
  display_name = "Require MFA"
  state        = "enabled"

  grant_controls {
    operator          = "OR"
    built_in_controls = ["mfa"]
  }
}
"#,
        );
        let policy = policy_from_block(&block);
        assert_eq!(policy.display_name.as_deref(), Some("Require MFA"));
        assert_eq!(policy.state.as_deref(), Some("enabled"));
        let grant = policy.grant_controls.expect("grant controls parsed");
        assert_eq!(grant.operator.as_deref(), Some("OR"));
        assert_eq!(
            grant.built_in_controls,
            Some(RawValue::List(vec!["mfa".to_string()]))
        );
    }

    #[test]
    fn missing_attributes_read_as_none() {
        let block = policy_block(
            r#"
resource "azuread_conditional_access_policy" "sparse" {
  display_name = "Sparse"
}
"#,
        );
        let policy = policy_from_block(&block);
        assert_eq!(policy.state, None);
        assert_eq!(policy.conditions, None);
        assert_eq!(policy.grant_controls, None);
        assert_eq!(policy.session_controls, None);
    }

    #[test]
    fn reads_nested_condition_sub_blocks() {
        let block = policy_block(
            r#"
resource "azuread_conditional_access_policy" "nested" {
  conditions {
    client_app_types = ["exchangeActiveSync", "other"]
    applications {
      included_applications = ["All"]
    }
    users {
      included_users  = ["All"]
      excluded_groups = [var.break_glass_group]
    }
  }
}
"#,
        );
        let conditions = policy_from_block(&block).conditions.expect("conditions");
        assert_eq!(
            conditions.client_app_types,
            Some(RawValue::List(vec![
                "exchangeActiveSync".to_string(),
                "other".to_string()
            ]))
        );
        let users = conditions.users.expect("users block");
        assert_eq!(
            users.excluded_groups,
            Some(RawValue::List(vec!["var.break_glass_group".to_string()]))
        );
        assert_eq!(
            conditions
                .applications
                .expect("applications block")
                .included_applications,
            Some(RawValue::List(vec!["All".to_string()]))
        );
    }

    #[test]
    fn unresolved_reference_tokens_pass_through() {
        let block = policy_block(
            r#"
resource "azuread_conditional_access_policy" "ref" {
  display_name = "By Reference"
  state        = var.policy_state
}
"#,
        );
        let policy = policy_from_block(&block);
        assert_eq!(policy.state.as_deref(), Some("var.policy_state"));
    }

    #[test]
    fn multiline_lists_are_read() {
        let block = policy_block(
            r#"
resource "azuread_conditional_access_policy" "multiline" {
  conditions {
    client_app_types = [
      "browser",
      "mobileAppsAndDesktopClients",
    ]
  }
}
"#,
        );
        let conditions = policy_from_block(&block).conditions.expect("conditions");
        assert_eq!(
            conditions.client_app_types,
            Some(RawValue::List(vec![
                "browser".to_string(),
                "mobileAppsAndDesktopClients".to_string()
            ]))
        );
    }

    #[test]
    fn variable_defaults_scalar_and_list() {
        let text = r#"
variable "policy_state" {
  type    = string
  default = "enabled"
}
variable "excluded_groups" {
  type    = list(string)
  default = ["break-glass", "service-accounts"]
}
variable "no_default" {
  type = string
}
"#;
        let (blocks, _) = extract_blocks(text, BlockKind::Variable, "vars.tf");
        let vars: Vec<_> = blocks.iter().map(variable_from_block).collect();
        assert_eq!(vars[0].declared_type.as_deref(), Some("string"));
        assert_eq!(
            vars[0].default_value,
            Some(RawValue::Scalar("enabled".to_string()))
        );
        assert_eq!(vars[1].declared_type.as_deref(), Some("list(string)"));
        assert_eq!(
            vars[1].default_value,
            Some(RawValue::List(vec![
                "break-glass".to_string(),
                "service-accounts".to_string()
            ]))
        );
        assert_eq!(vars[2].default_value, None);
    }

    #[test]
    fn locals_split_into_assignments() {
        let text = r#"
locals {
  admin_group = "Global Admins"
  app_list    = ["All"]
}
"#;
        let (blocks, _) = extract_blocks(text, BlockKind::Locals, "locals.tf");
        let locals = locals_from_block(&blocks[0]);
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[0].name, "admin_group");
        assert_eq!(locals[0].raw_value_text, r#""Global Admins""#);
        assert_eq!(locals[1].raw_value_text, r#"["All"]"#);
    }

    #[test]
    fn session_controls_scalars_are_typed() {
        let block = policy_block(
            r#"
resource "azuread_conditional_access_policy" "session" {
  session_controls {
    sign_in_frequency        = 4
    sign_in_frequency_period = "hours"
    disable_resilience_defaults = false
  }
}
"#,
        );
        let controls = policy_from_block(&block)
            .session_controls
            .expect("session controls");
        assert_eq!(controls["sign_in_frequency"], serde_json::json!(4));
        assert_eq!(controls["sign_in_frequency_period"], serde_json::json!("hours"));
        assert_eq!(controls["disable_resilience_defaults"], serde_json::json!(false));
    }
}
