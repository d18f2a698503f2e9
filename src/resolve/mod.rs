//! Variable and local reference resolution.
//!
//! Configuration leaves may carry `var.NAME`, `local.NAME`, or `data.*`
//! tokens. Resolution is total: it always returns a value (resolved, or the
//! original token passed through) plus zero or more diagnostics, and it never
//! fails destructively. It runs lazily at normalization time so a partial or
//! unparsed file does not block resolution of already-complete ones.
//!
//! Locals are substituted by their raw value text; references *inside* that
//! text are not re-resolved.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::diagnostics::Diagnostic;
use crate::parser::{ConfigLocal, ConfigVariable, RawValue};

/// A resolved value together with the diagnostics resolution produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Resolution<T> {
    fn clean(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }
}

static QUOTED_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"([^"]*)"$"#).unwrap());
static BRACKETED_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(.*)\]$").unwrap());
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|([A-Za-z0-9_.\-]+)"#).unwrap());

/// Resolves `var.`/`local.` indirection against parsed declarations.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    variables: HashMap<String, ConfigVariable>,
    locals: HashMap<String, ConfigLocal>,
}

impl ReferenceResolver {
    pub fn new(variables: Vec<ConfigVariable>, locals: Vec<ConfigLocal>) -> Self {
        Self {
            variables: variables.into_iter().map(|v| (v.name.clone(), v)).collect(),
            locals: locals.into_iter().map(|l| (l.name.clone(), l)).collect(),
        }
    }

    /// Resolve a single token. Non-reference tokens pass through untouched.
    pub fn resolve(&self, raw: &str) -> Resolution<RawValue> {
        if let Some(name) = raw.strip_prefix("var.") {
            return self.resolve_variable(raw, name);
        }
        if let Some(name) = raw.strip_prefix("local.") {
            return self.resolve_local(raw, name);
        }
        if raw.starts_with("data.") {
            // External-provider data cannot be known statically.
            return Resolution {
                value: RawValue::Scalar(raw.to_string()),
                diagnostics: vec![Diagnostic::warning(
                    raw,
                    "data source reference cannot be resolved statically; passed through",
                )],
            };
        }
        Resolution::clean(RawValue::Scalar(raw.to_string()))
    }

    fn resolve_variable(&self, raw: &str, name: &str) -> Resolution<RawValue> {
        match self.variables.get(name) {
            Some(variable) => match &variable.default_value {
                Some(default) => Resolution::clean(default.clone()),
                None => Resolution {
                    value: RawValue::Scalar(raw.to_string()),
                    diagnostics: vec![Diagnostic::warning(
                        raw,
                        format!("variable '{}' has no default value; passed through", name),
                    )],
                },
            },
            None => Resolution {
                value: RawValue::Scalar(raw.to_string()),
                diagnostics: vec![Diagnostic::warning(
                    raw,
                    format!("unresolved variable '{}'; passed through", name),
                )],
            },
        }
    }

    fn resolve_local(&self, raw: &str, name: &str) -> Resolution<RawValue> {
        match self.locals.get(name) {
            Some(local) => Resolution::clean(shape_raw_text(&local.raw_value_text)),
            None => Resolution {
                value: RawValue::Scalar(raw.to_string()),
                diagnostics: vec![Diagnostic::warning(
                    raw,
                    format!("local '{}' not found; passed through", name),
                )],
            },
        }
    }

    /// Resolve a scalar-position value, flattening a list result to its first
    /// element when a variable default turns out to be a list.
    pub fn resolve_scalar(&self, raw: &str) -> Resolution<String> {
        let resolution = self.resolve(raw);
        let mut diagnostics = resolution.diagnostics;
        let value = match resolution.value {
            RawValue::Scalar(s) => s,
            RawValue::List(items) => {
                diagnostics.push(Diagnostic::warning(
                    raw,
                    "list value used in scalar position; using first element",
                ));
                items.into_iter().next().unwrap_or_default()
            }
        };
        Resolution { value, diagnostics }
    }

    /// Resolve a list-position value. A list resolves item by item; a scalar
    /// (including one produced by a reference) becomes a one-element list.
    pub fn resolve_items(&self, raw: &RawValue) -> Resolution<Vec<String>> {
        match raw {
            RawValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut diagnostics = Vec::new();
                for item in items {
                    let resolution = self.resolve(item);
                    diagnostics.extend(resolution.diagnostics);
                    match resolution.value {
                        RawValue::Scalar(s) => out.push(s),
                        RawValue::List(nested) => out.extend(nested),
                    }
                }
                Resolution {
                    value: out,
                    diagnostics,
                }
            }
            RawValue::Scalar(token) => {
                let resolution = self.resolve(token);
                let value = match resolution.value {
                    RawValue::List(items) => items,
                    RawValue::Scalar(s) => vec![s],
                };
                Resolution {
                    value,
                    diagnostics: resolution.diagnostics,
                }
            }
        }
    }
}

/// Interpret a local's raw text by shape only: a quoted string is unquoted, a
/// bracketed list is split into items, anything else is verbatim.
fn shape_raw_text(text: &str) -> RawValue {
    let trimmed = text.trim();
    if let Some(captures) = QUOTED_TEXT.captures(trimmed) {
        return RawValue::Scalar(captures[1].to_string());
    }
    if let Some(captures) = BRACKETED_LIST.captures(trimmed) {
        let inner = captures[1].to_string();
        let items = LIST_ITEM
            .captures_iter(&inner)
            .filter_map(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| m.as_str().to_string())
            })
            .collect();
        return RawValue::List(items);
    }
    RawValue::Scalar(trimmed.to_string())
}
