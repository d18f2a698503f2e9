//! Parsing of declared policy representations.
//!
//! Two front ends produce the same [`ConfigPolicy`] shape: a narrow text
//! parser for Terraform-like declaration files (`blocks` + `attributes`) and
//! a reader for applied state JSON (`state`). The text parser is deliberately
//! not grammar-complete: no expression evaluation, no loops or dynamic
//! blocks, no function calls. It is isolated behind this module's entry
//! points so a real grammar-based parser could replace it without touching
//! normalization, matching, or diffing.

pub mod attributes;
pub mod blocks;
pub mod state;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::Diagnostic;

pub use blocks::{extract_blocks, BlockKind};
pub use state::parse_state_document;

/// Errors that make an entire input file unusable. Per-declaration problems
/// are diagnostics, not errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },
}

/// An extracted, still-unparsed declaration body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub declared_name: String,
    /// Exact text between the block's braces.
    pub body_text: String,
}

/// A parsed attribute value: either a single scalar token or a list of
/// strings. Scalars may still be unresolved `var.`/`local.`/`data.` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Scalar(String),
    List(Vec<String>),
}

/// A `variable` declaration with an optional default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVariable {
    pub name: String,
    pub declared_type: Option<String>,
    pub default_value: Option<RawValue>,
}

/// A single assignment inside a `locals` block. The value is kept as raw
/// text; resolution decides how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLocal {
    pub name: String,
    pub raw_value_text: String,
}

/// A policy as declared in configuration, before reference resolution and
/// normalization. Field names mirror the declaration language (snake_case).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPolicy {
    pub declaration_name: String,
    pub display_name: Option<String>,
    pub state: Option<String>,
    pub conditions: Option<ConfigConditions>,
    pub grant_controls: Option<ConfigGrantControls>,
    pub session_controls: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigConditions {
    pub client_app_types: Option<RawValue>,
    pub sign_in_risk_levels: Option<RawValue>,
    pub user_risk_levels: Option<RawValue>,
    pub applications: Option<ConfigApplications>,
    pub users: Option<ConfigUsers>,
    pub platforms: Option<ConfigPlatforms>,
    pub locations: Option<ConfigLocations>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigApplications {
    pub included_applications: Option<RawValue>,
    pub excluded_applications: Option<RawValue>,
    pub included_user_actions: Option<RawValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUsers {
    pub included_users: Option<RawValue>,
    pub excluded_users: Option<RawValue>,
    pub included_groups: Option<RawValue>,
    pub excluded_groups: Option<RawValue>,
    pub included_roles: Option<RawValue>,
    pub excluded_roles: Option<RawValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPlatforms {
    pub included_platforms: Option<RawValue>,
    pub excluded_platforms: Option<RawValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigLocations {
    pub included_locations: Option<RawValue>,
    pub excluded_locations: Option<RawValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigGrantControls {
    pub operator: Option<String>,
    pub built_in_controls: Option<RawValue>,
    pub custom_authentication_factors: Option<RawValue>,
    pub terms_of_use: Option<RawValue>,
}

/// Everything parsed out of one configuration file: policies plus the
/// variable/local declarations the resolver needs.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    pub policies: Vec<ConfigPolicy>,
    pub variables: Vec<ConfigVariable>,
    pub locals: Vec<ConfigLocal>,
}

impl ConfigDocument {
    pub fn merge(&mut self, other: ConfigDocument) {
        self.policies.extend(other.policies);
        self.variables.extend(other.variables);
        self.locals.extend(other.locals);
    }
}

/// Parse one configuration file's text. `resource_type` selects which
/// resource blocks become policies; `origin` labels diagnostics (usually the
/// file path). Per-declaration failures skip that declaration only.
pub fn parse_configuration_text(
    text: &str,
    resource_type: &str,
    origin: &str,
) -> (ConfigDocument, Vec<Diagnostic>) {
    let mut document = ConfigDocument::default();
    let mut diagnostics = Vec::new();

    let (resource_blocks, mut diags) =
        extract_blocks(text, BlockKind::Resource(resource_type), origin);
    diagnostics.append(&mut diags);
    for block in resource_blocks {
        document.policies.push(attributes::policy_from_block(&block));
    }

    let (variable_blocks, mut diags) = extract_blocks(text, BlockKind::Variable, origin);
    diagnostics.append(&mut diags);
    for block in variable_blocks {
        document.variables.push(attributes::variable_from_block(&block));
    }

    let (locals_blocks, mut diags) = extract_blocks(text, BlockKind::Locals, origin);
    diagnostics.append(&mut diags);
    for block in locals_blocks {
        document.locals.extend(attributes::locals_from_block(&block));
    }

    (document, diagnostics)
}
