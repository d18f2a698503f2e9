//! Applied-state JSON reader.
//!
//! Reads a Terraform state document (`resources[].type`,
//! `resources[].instances[].attributes`) into the same [`ConfigPolicy`] shape
//! the text parser produces. The source is already structured, so this walks
//! the JSON tree directly; the attribute names arrive in snake_case as in
//! declaration text.

use serde_json::Value;

use super::{
    ConfigApplications, ConfigConditions, ConfigGrantControls, ConfigLocations, ConfigPlatforms,
    ConfigPolicy, ConfigUsers, ParseError, RawValue,
};
use crate::diagnostics::Diagnostic;
use crate::tree;

/// Parse state-document text and read every instance of `resource_type` as a
/// policy. Returns `Err` only when the document itself is unusable; a
/// malformed individual resource is skipped with a diagnostic.
pub fn parse_state_document(
    text: &str,
    resource_type: &str,
    origin: &str,
) -> Result<(Vec<ConfigPolicy>, Vec<Diagnostic>), ParseError> {
    let document: Value = serde_json::from_str(text)?;
    let resources = match tree::get(&document, "resources") {
        Ok(v) => tree::as_array(v, "resources").map_err(|e| ParseError::InvalidDocument {
            reason: e.to_string(),
        })?,
        Err(_) => {
            return Err(ParseError::InvalidDocument {
                reason: "no top-level 'resources' array; not a state document".to_string(),
            })
        }
    };

    let mut policies = Vec::new();
    let mut diagnostics = Vec::new();

    for resource in resources {
        match tree::opt_str(resource, "type") {
            Ok(Some(ty)) if ty == resource_type => {}
            Ok(_) => continue,
            Err(e) => {
                diagnostics.push(Diagnostic::error(origin, e.to_string()));
                continue;
            }
        }
        let name = match tree::opt_str(resource, "name") {
            Ok(Some(name)) => name.to_string(),
            Ok(None) => "unnamed".to_string(),
            Err(e) => {
                diagnostics.push(Diagnostic::error(origin, e.to_string()));
                continue;
            }
        };
        let instances = match tree::get(resource, "instances").and_then(|v| {
            tree::as_array(v, "instances").map(|a| a.as_slice())
        }) {
            Ok(instances) => instances,
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    origin,
                    format!("resource '{}': {}", name, e),
                ));
                continue;
            }
        };
        for (index, instance) in instances.iter().enumerate() {
            let attributes = match tree::get(instance, "attributes") {
                Ok(attributes) => attributes,
                Err(e) => {
                    diagnostics.push(Diagnostic::error(
                        origin,
                        format!("resource '{}' instance {}: {}", name, index, e),
                    ));
                    continue;
                }
            };
            // Indexed instances (count > 1) get distinct declaration names so
            // derived ids stay unique.
            let declaration_name = if instances.len() > 1 {
                format!("{}[{}]", name, index)
            } else {
                name.clone()
            };
            let (policy, mut diags) =
                policy_from_attributes(attributes, declaration_name, origin);
            policies.push(policy);
            diagnostics.append(&mut diags);
        }
    }

    Ok((policies, diagnostics))
}

fn items(value: &Value, key: &str, origin: &str, diags: &mut Vec<Diagnostic>) -> Option<RawValue> {
    match tree::opt_string_array(value, key) {
        Ok(list) => list.map(RawValue::List),
        Err(e) => {
            diags.push(Diagnostic::warning(origin, e.to_string()));
            None
        }
    }
}

fn scalar(value: &Value, key: &str, origin: &str, diags: &mut Vec<Diagnostic>) -> Option<String> {
    match tree::opt_str(value, key) {
        Ok(s) => s.map(str::to_string),
        Err(e) => {
            diags.push(Diagnostic::warning(origin, e.to_string()));
            None
        }
    }
}

/// Nested block: applied state renders these as single-element arrays of
/// objects, declaration-style JSON as plain objects. Both are accepted.
fn nested<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match tree::get(value, key) {
        Ok(v) => tree::first_object(v),
        Err(_) => None,
    }
}

fn policy_from_attributes(
    attributes: &Value,
    declaration_name: String,
    origin: &str,
) -> (ConfigPolicy, Vec<Diagnostic>) {
    let mut diags = Vec::new();

    let conditions = nested(attributes, "conditions").map(|block| ConfigConditions {
        client_app_types: items(block, "client_app_types", origin, &mut diags),
        sign_in_risk_levels: items(block, "sign_in_risk_levels", origin, &mut diags),
        user_risk_levels: items(block, "user_risk_levels", origin, &mut diags),
        applications: nested(block, "applications").map(|b| ConfigApplications {
            included_applications: items(b, "included_applications", origin, &mut diags),
            excluded_applications: items(b, "excluded_applications", origin, &mut diags),
            included_user_actions: items(b, "included_user_actions", origin, &mut diags),
        }),
        users: nested(block, "users").map(|b| ConfigUsers {
            included_users: items(b, "included_users", origin, &mut diags),
            excluded_users: items(b, "excluded_users", origin, &mut diags),
            included_groups: items(b, "included_groups", origin, &mut diags),
            excluded_groups: items(b, "excluded_groups", origin, &mut diags),
            included_roles: items(b, "included_roles", origin, &mut diags),
            excluded_roles: items(b, "excluded_roles", origin, &mut diags),
        }),
        platforms: nested(block, "platforms").map(|b| ConfigPlatforms {
            included_platforms: items(b, "included_platforms", origin, &mut diags),
            excluded_platforms: items(b, "excluded_platforms", origin, &mut diags),
        }),
        locations: nested(block, "locations").map(|b| ConfigLocations {
            included_locations: items(b, "included_locations", origin, &mut diags),
            excluded_locations: items(b, "excluded_locations", origin, &mut diags),
        }),
    });

    let grant_controls = nested(attributes, "grant_controls").map(|block| ConfigGrantControls {
        operator: scalar(block, "operator", origin, &mut diags),
        built_in_controls: items(block, "built_in_controls", origin, &mut diags),
        custom_authentication_factors: items(
            block,
            "custom_authentication_factors",
            origin,
            &mut diags,
        ),
        terms_of_use: items(block, "terms_of_use", origin, &mut diags),
    });

    let session_controls = nested(attributes, "session_controls").cloned();

    let policy = ConfigPolicy {
        declaration_name,
        display_name: scalar(attributes, "display_name", origin, &mut diags),
        state: scalar(attributes, "state", origin, &mut diags),
        conditions,
        grant_controls,
        session_controls,
    };
    (policy, diags)
}
