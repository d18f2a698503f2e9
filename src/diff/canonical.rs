//! Canonical policy comparison.
//!
//! Explicit, named, section-by-section equality over two [`CanonicalPolicy`]
//! values. Each inequality appends one human-readable difference string.
//! Severity weighting of differences belongs to downstream consumers, not
//! here.

use crate::normalize::{string_set_eq, CanonicalPolicy};

/// Compare two canonical policies section by section. An empty result means
/// the policies agree on every compared section.
pub fn diff_canonical(a: &CanonicalPolicy, b: &CanonicalPolicy) -> Vec<String> {
    let mut differences = Vec::new();

    if a.state != b.state {
        differences.push(format!(
            "Policy state differs: {} vs {}",
            a.state, b.state
        ));
    }

    let apps_a = &a.conditions.applications;
    let apps_b = &b.conditions.applications;
    if !string_set_eq(&apps_a.include, &apps_b.include)
        || !string_set_eq(&apps_a.exclude, &apps_b.exclude)
        || !string_set_eq(&apps_a.user_actions, &apps_b.user_actions)
    {
        differences.push("Application conditions differ".to_string());
    }

    let users_a = &a.conditions.users;
    let users_b = &b.conditions.users;
    if !string_set_eq(&users_a.include_users, &users_b.include_users)
        || !string_set_eq(&users_a.exclude_users, &users_b.exclude_users)
        || !string_set_eq(&users_a.include_groups, &users_b.include_groups)
        || !string_set_eq(&users_a.exclude_groups, &users_b.exclude_groups)
        || !string_set_eq(&users_a.include_roles, &users_b.include_roles)
        || !string_set_eq(&users_a.exclude_roles, &users_b.exclude_roles)
    {
        differences.push("User conditions differ".to_string());
    }

    if !string_set_eq(&a.conditions.platforms.include, &b.conditions.platforms.include)
        || !string_set_eq(&a.conditions.platforms.exclude, &b.conditions.platforms.exclude)
    {
        differences.push("Platform conditions differ".to_string());
    }

    if !string_set_eq(&a.conditions.locations.include, &b.conditions.locations.include)
        || !string_set_eq(&a.conditions.locations.exclude, &b.conditions.locations.exclude)
    {
        differences.push("Location conditions differ".to_string());
    }

    if !string_set_eq(&a.conditions.client_app_types, &b.conditions.client_app_types) {
        differences.push("Client app types differ".to_string());
    }

    if !string_set_eq(
        &a.conditions.sign_in_risk_levels,
        &b.conditions.sign_in_risk_levels,
    ) {
        differences.push("Sign-in risk levels differ".to_string());
    }

    if !string_set_eq(&a.conditions.user_risk_levels, &b.conditions.user_risk_levels) {
        differences.push("User risk levels differ".to_string());
    }

    match (&a.grant_controls, &b.grant_controls) {
        (None, None) => {}
        (Some(_), None) | (None, Some(_)) => {
            differences.push("Grant controls differ: present on one side only".to_string());
        }
        (Some(grant_a), Some(grant_b)) => {
            let op_a = grant_a.operator.as_deref().unwrap_or("");
            let op_b = grant_b.operator.as_deref().unwrap_or("");
            if !op_a.eq_ignore_ascii_case(op_b) {
                differences.push(format!(
                    "Grant control operator differs: {} vs {}",
                    op_a, op_b
                ));
            }
            if !string_set_eq(&grant_a.built_in_controls, &grant_b.built_in_controls) {
                differences.push("Built-in grant controls differ".to_string());
            }
            if !string_set_eq(
                &grant_a.custom_authentication_factors,
                &grant_b.custom_authentication_factors,
            ) {
                differences.push("Custom authentication factors differ".to_string());
            }
            if !string_set_eq(&grant_a.terms_of_use, &grant_b.terms_of_use) {
                differences.push("Terms of use differ".to_string());
            }
        }
    }

    differences
}
