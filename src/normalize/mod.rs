//! Policy normalization into the canonical schema.
//!
//! Two entry points produce the same [`CanonicalPolicy`] shape: one for raw
//! JSON policy objects (canonical PascalCase field names, read directly) and
//! one for parsed configuration policies (leaves pass through the reference
//! resolver first, then snake_case names map into the canonical schema).
//! Canonical policies are immutable for the duration of a comparison run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::diagnostics::Diagnostic;
use crate::parser::{ConfigPolicy, RawValue};
use crate::resolve::ReferenceResolver;
use crate::tree;

/// Namespace for deriving stable policy ids from declaration names.
const POLICY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8f1d_7c2a_55e4_49b3_a6d0_93c8_41f7_e25b);

/// Three-valued policy activation status. Genuinely unknown state strings are
/// passed through lower-cased in `Other` and flagged with a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyState {
    Enabled,
    Disabled,
    ReportOnly,
    Other(String),
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyState::Enabled => write!(f, "enabled"),
            PolicyState::Disabled => write!(f, "disabled"),
            PolicyState::ReportOnly => write!(f, "reportOnly"),
            PolicyState::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Which representation a canonical policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Json,
    Config,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalApplications {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub user_actions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUsers {
    pub include_users: Vec<String>,
    pub exclude_users: Vec<String>,
    pub include_groups: Vec<String>,
    pub exclude_groups: Vec<String>,
    pub include_roles: Vec<String>,
    pub exclude_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPlatforms {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLocations {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalConditions {
    pub client_app_types: Vec<String>,
    pub sign_in_risk_levels: Vec<String>,
    pub user_risk_levels: Vec<String>,
    pub applications: CanonicalApplications,
    pub users: CanonicalUsers,
    pub platforms: CanonicalPlatforms,
    pub locations: CanonicalLocations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalGrantControls {
    pub operator: Option<String>,
    pub built_in_controls: Vec<String>,
    pub custom_authentication_factors: Vec<String>,
    pub terms_of_use: Vec<String>,
}

/// The unified, format-independent policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPolicy {
    pub id: String,
    pub display_name: String,
    pub state: PolicyState,
    pub source_format: SourceFormat,
    /// File stem, declaration name, or export identifier the record came from.
    pub source_identifier: String,
    pub conditions: CanonicalConditions,
    pub grant_controls: Option<CanonicalGrantControls>,
    pub session_controls: Option<Value>,
    pub original_payload: Value,
}

/// Known state spellings. Case-folded before lookup; the table must stay
/// total over every synonym the cloud export or provider emits.
const STATE_SYNONYMS: &[(&str, PolicyState)] = &[
    ("enabled", PolicyState::Enabled),
    ("on", PolicyState::Enabled),
    ("true", PolicyState::Enabled),
    ("disabled", PolicyState::Disabled),
    ("off", PolicyState::Disabled),
    ("false", PolicyState::Disabled),
    ("reportonly", PolicyState::ReportOnly),
    ("report-only", PolicyState::ReportOnly),
    ("report_only", PolicyState::ReportOnly),
    ("enabledforreportingbutnotenforced", PolicyState::ReportOnly),
    ("enabledforcontrolvalidationonly", PolicyState::ReportOnly),
];

/// Map a raw state string onto the canonical enum. Absent or empty defaults
/// to disabled; unknown spellings pass through lower-cased with a diagnostic.
pub fn canonicalize_state(raw: Option<&str>, origin: &str) -> (PolicyState, Option<Diagnostic>) {
    let raw = match raw.map(str::trim) {
        None | Some("") => return (PolicyState::Disabled, None),
        Some(raw) => raw,
    };
    let folded = raw.to_ascii_lowercase();
    for (synonym, state) in STATE_SYNONYMS {
        if folded == *synonym {
            return (state.clone(), None);
        }
    }
    let diagnostic = Diagnostic::warning(
        origin,
        format!("unknown policy state '{}'; passed through lower-cased", raw),
    );
    (PolicyState::Other(folded), Some(diagnostic))
}

/// Deterministically derive a stable policy id from a configuration
/// declaration name: a name-based UUID, so the same declaration name always
/// yields the same id within and across runs.
pub fn derived_policy_id(declaration_name: &str) -> String {
    Uuid::new_v5(&POLICY_ID_NAMESPACE, declaration_name.as_bytes()).to_string()
}

/// Order- and case-insensitive string-set equality, used wherever the
/// comparison treats lists as sets.
pub fn string_set_eq(a: &[String], b: &[String]) -> bool {
    use std::collections::BTreeSet;
    let fold = |items: &[String]| -> BTreeSet<String> {
        items.iter().map(|s| s.to_ascii_lowercase()).collect()
    };
    fold(a) == fold(b)
}

fn json_scalar(
    value: &Value,
    key: &str,
    origin: &str,
    diags: &mut Vec<Diagnostic>,
) -> Option<String> {
    match tree::opt_str(value, key) {
        Ok(s) => s.map(str::to_string),
        Err(e) => {
            diags.push(Diagnostic::warning(origin, e.to_string()));
            None
        }
    }
}

fn json_items(value: &Value, key: &str, origin: &str, diags: &mut Vec<Diagnostic>) -> Vec<String> {
    match tree::opt_string_array(value, key) {
        Ok(items) => items.unwrap_or_default(),
        Err(e) => {
            diags.push(Diagnostic::warning(origin, e.to_string()));
            Vec::new()
        }
    }
}

fn json_object<'a>(
    value: &'a Value,
    key: &str,
    origin: &str,
    diags: &mut Vec<Diagnostic>,
) -> Option<&'a Value> {
    match tree::opt_object(value, key) {
        Ok(v) => v,
        Err(e) => {
            diags.push(Diagnostic::warning(origin, e.to_string()));
            None
        }
    }
}

impl CanonicalPolicy {
    /// Normalize a raw JSON policy object (canonical PascalCase fields).
    pub fn from_json(payload: &Value, source_identifier: &str) -> (Self, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let origin = source_identifier;

        let display_name = match json_scalar(payload, "DisplayName", origin, &mut diags) {
            Some(name) => name,
            None => {
                diags.push(Diagnostic::warning(origin, "policy has no DisplayName"));
                String::new()
            }
        };
        let id = match json_scalar(payload, "Id", origin, &mut diags) {
            Some(id) => id,
            None => {
                diags.push(Diagnostic::warning(
                    origin,
                    "policy has no native Id; deriving one from its display name",
                ));
                derived_policy_id(&display_name)
            }
        };
        let raw_state = json_scalar(payload, "State", origin, &mut diags);
        let (state, state_diag) = canonicalize_state(raw_state.as_deref(), origin);
        diags.extend(state_diag);

        let mut conditions = CanonicalConditions::default();
        if let Some(block) = json_object(payload, "Conditions", origin, &mut diags) {
            conditions.client_app_types = json_items(block, "ClientAppTypes", origin, &mut diags);
            conditions.sign_in_risk_levels =
                json_items(block, "SignInRiskLevels", origin, &mut diags);
            conditions.user_risk_levels = json_items(block, "UserRiskLevels", origin, &mut diags);
            if let Some(apps) = json_object(block, "Applications", origin, &mut diags) {
                conditions.applications = CanonicalApplications {
                    include: json_items(apps, "IncludeApplications", origin, &mut diags),
                    exclude: json_items(apps, "ExcludeApplications", origin, &mut diags),
                    user_actions: json_items(apps, "IncludeUserActions", origin, &mut diags),
                };
            }
            if let Some(users) = json_object(block, "Users", origin, &mut diags) {
                conditions.users = CanonicalUsers {
                    include_users: json_items(users, "IncludeUsers", origin, &mut diags),
                    exclude_users: json_items(users, "ExcludeUsers", origin, &mut diags),
                    include_groups: json_items(users, "IncludeGroups", origin, &mut diags),
                    exclude_groups: json_items(users, "ExcludeGroups", origin, &mut diags),
                    include_roles: json_items(users, "IncludeRoles", origin, &mut diags),
                    exclude_roles: json_items(users, "ExcludeRoles", origin, &mut diags),
                };
            }
            if let Some(platforms) = json_object(block, "Platforms", origin, &mut diags) {
                conditions.platforms = CanonicalPlatforms {
                    include: json_items(platforms, "IncludePlatforms", origin, &mut diags),
                    exclude: json_items(platforms, "ExcludePlatforms", origin, &mut diags),
                };
            }
            if let Some(locations) = json_object(block, "Locations", origin, &mut diags) {
                conditions.locations = CanonicalLocations {
                    include: json_items(locations, "IncludeLocations", origin, &mut diags),
                    exclude: json_items(locations, "ExcludeLocations", origin, &mut diags),
                };
            }
        }

        let grant_controls =
            json_object(payload, "GrantControls", origin, &mut diags).map(|block| {
                CanonicalGrantControls {
                    operator: json_scalar(block, "Operator", origin, &mut diags),
                    built_in_controls: json_items(block, "BuiltInControls", origin, &mut diags),
                    custom_authentication_factors: json_items(
                        block,
                        "CustomAuthenticationFactors",
                        origin,
                        &mut diags,
                    ),
                    terms_of_use: json_items(block, "TermsOfUse", origin, &mut diags),
                }
            });

        let session_controls = match tree::get(payload, "SessionControls") {
            Ok(Value::Null) | Err(_) => None,
            Ok(v) => Some(v.clone()),
        };

        let policy = Self {
            id,
            display_name,
            state,
            source_format: SourceFormat::Json,
            source_identifier: source_identifier.to_string(),
            conditions,
            grant_controls,
            session_controls,
            original_payload: payload.clone(),
        };
        (policy, diags)
    }

    /// Normalize a parsed configuration policy. Every leaf passes through the
    /// resolver before field names map into the canonical schema.
    pub fn from_config(
        config: &ConfigPolicy,
        resolver: &ReferenceResolver,
        source_identifier: &str,
    ) -> (Self, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let origin = source_identifier;

        let resolve_scalar = |raw: &Option<String>, diags: &mut Vec<Diagnostic>| match raw {
            Some(raw) => {
                let resolution = resolver.resolve_scalar(raw);
                diags.extend(resolution.diagnostics);
                Some(resolution.value)
            }
            None => None,
        };
        let resolve_items = |raw: &Option<RawValue>, diags: &mut Vec<Diagnostic>| match raw {
            Some(raw) => {
                let resolution = resolver.resolve_items(raw);
                diags.extend(resolution.diagnostics);
                resolution.value
            }
            None => Vec::new(),
        };

        let display_name = resolve_scalar(&config.display_name, &mut diags)
            .unwrap_or_else(|| config.declaration_name.clone());
        let raw_state = resolve_scalar(&config.state, &mut diags);
        let (state, state_diag) = canonicalize_state(raw_state.as_deref(), origin);
        diags.extend(state_diag);

        let mut conditions = CanonicalConditions::default();
        if let Some(block) = &config.conditions {
            conditions.client_app_types = resolve_items(&block.client_app_types, &mut diags);
            conditions.sign_in_risk_levels = resolve_items(&block.sign_in_risk_levels, &mut diags);
            conditions.user_risk_levels = resolve_items(&block.user_risk_levels, &mut diags);
            if let Some(apps) = &block.applications {
                conditions.applications = CanonicalApplications {
                    include: resolve_items(&apps.included_applications, &mut diags),
                    exclude: resolve_items(&apps.excluded_applications, &mut diags),
                    user_actions: resolve_items(&apps.included_user_actions, &mut diags),
                };
            }
            if let Some(users) = &block.users {
                conditions.users = CanonicalUsers {
                    include_users: resolve_items(&users.included_users, &mut diags),
                    exclude_users: resolve_items(&users.excluded_users, &mut diags),
                    include_groups: resolve_items(&users.included_groups, &mut diags),
                    exclude_groups: resolve_items(&users.excluded_groups, &mut diags),
                    include_roles: resolve_items(&users.included_roles, &mut diags),
                    exclude_roles: resolve_items(&users.excluded_roles, &mut diags),
                };
            }
            if let Some(platforms) = &block.platforms {
                conditions.platforms = CanonicalPlatforms {
                    include: resolve_items(&platforms.included_platforms, &mut diags),
                    exclude: resolve_items(&platforms.excluded_platforms, &mut diags),
                };
            }
            if let Some(locations) = &block.locations {
                conditions.locations = CanonicalLocations {
                    include: resolve_items(&locations.included_locations, &mut diags),
                    exclude: resolve_items(&locations.excluded_locations, &mut diags),
                };
            }
        }

        let grant_controls = config.grant_controls.as_ref().map(|block| {
            CanonicalGrantControls {
                operator: resolve_scalar(&block.operator, &mut diags),
                built_in_controls: resolve_items(&block.built_in_controls, &mut diags),
                custom_authentication_factors: resolve_items(
                    &block.custom_authentication_factors,
                    &mut diags,
                ),
                terms_of_use: resolve_items(&block.terms_of_use, &mut diags),
            }
        });

        let policy = Self {
            id: derived_policy_id(&config.declaration_name),
            display_name,
            state,
            source_format: SourceFormat::Config,
            source_identifier: source_identifier.to_string(),
            conditions,
            grant_controls,
            session_controls: config.session_controls.clone(),
            original_payload: serde_json::to_value(config).unwrap_or(Value::Null),
        };
        (policy, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_synonyms_fold_to_report_only() {
        for raw in [
            "enabledForReportingButNotEnforced",
            "enabledForControlValidationOnly",
            "REPORT-ONLY",
            "reportOnly",
        ] {
            let (state, diag) = canonicalize_state(Some(raw), "test");
            assert_eq!(state, PolicyState::ReportOnly, "input {:?}", raw);
            assert!(diag.is_none(), "input {:?}", raw);
        }
    }

    #[test]
    fn absent_state_defaults_to_disabled() {
        assert_eq!(canonicalize_state(None, "test").0, PolicyState::Disabled);
        assert_eq!(
            canonicalize_state(Some("  "), "test").0,
            PolicyState::Disabled
        );
    }

    #[test]
    fn unknown_state_passes_through_lowercased_with_diagnostic() {
        let (state, diag) = canonicalize_state(Some("Experimental"), "test");
        assert_eq!(state, PolicyState::Other("experimental".to_string()));
        assert!(diag.is_some());
    }

    #[test]
    fn derived_ids_are_stable() {
        let first = derived_policy_id("block_legacy_auth");
        let second = derived_policy_id("block_legacy_auth");
        assert_eq!(first, second);
        assert_ne!(first, derived_policy_id("require_mfa"));
        // Formatted as a UUID.
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn from_json_reads_canonical_fields() {
        let payload = json!({
            "Id": "0000-1111",
            "DisplayName": "Require MFA",
            "State": "enabled",
            "Conditions": {
                "ClientAppTypes": ["browser"],
                "Applications": { "IncludeApplications": ["All"] },
                "Users": { "IncludeUsers": ["All"], "ExcludeGroups": ["break-glass"] }
            },
            "GrantControls": { "Operator": "OR", "BuiltInControls": ["mfa"] }
        });
        let (policy, diags) = CanonicalPolicy::from_json(&payload, "Require MFA.json");
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        assert_eq!(policy.id, "0000-1111");
        assert_eq!(policy.state, PolicyState::Enabled);
        assert_eq!(policy.source_format, SourceFormat::Json);
        assert_eq!(policy.conditions.applications.include, vec!["All"]);
        assert_eq!(policy.conditions.users.exclude_groups, vec!["break-glass"]);
        assert_eq!(
            policy.grant_controls.expect("grant controls").built_in_controls,
            vec!["mfa"]
        );
        assert_eq!(policy.original_payload, payload);
    }

    #[test]
    fn from_json_flags_wrong_types_without_failing() {
        let payload = json!({
            "Id": "x",
            "DisplayName": "Odd",
            "State": "enabled",
            "Conditions": { "ClientAppTypes": "browser" }
        });
        let (policy, diags) = CanonicalPolicy::from_json(&payload, "odd.json");
        assert!(policy.conditions.client_app_types.is_empty());
        assert!(diags.iter().any(|d| d.message.contains("wrong type")));
    }

    #[test]
    fn string_set_equality_ignores_order_and_case() {
        let a = vec!["MFA".to_string(), "block".to_string()];
        let b = vec!["block".to_string(), "mfa".to_string()];
        assert!(string_set_eq(&a, &b));
        assert!(!string_set_eq(&a, &[]));
    }
}
