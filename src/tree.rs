//! Typed accessors over untyped JSON trees.
//!
//! The comparison core walks a lot of dynamically shaped JSON. These helpers
//! preserve the distinction between "field is absent" and "field has the wrong
//! type": the `opt_*` accessors map a missing field to `None` but still report
//! a type mismatch, so sloppy documents degrade loudly instead of silently.

use serde_json::Value;
use thiserror::Error;

/// Access errors for dynamic JSON lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("missing field '{path}'")]
    Missing { path: String },

    #[error("wrong type at '{path}': expected {expected}, found {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Human-readable name of a JSON value's type.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Look up a key on an object, failing if the key is absent or the value is
/// not an object.
pub fn get<'a>(value: &'a Value, key: &str) -> Result<&'a Value, TreeError> {
    let map = value.as_object().ok_or_else(|| TreeError::WrongType {
        path: key.to_string(),
        expected: "object",
        found: type_name(value),
    })?;
    map.get(key).ok_or_else(|| TreeError::Missing {
        path: key.to_string(),
    })
}

pub fn as_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, TreeError> {
    value.as_str().ok_or_else(|| TreeError::WrongType {
        path: path.to_string(),
        expected: "string",
        found: type_name(value),
    })
}

pub fn as_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, TreeError> {
    value.as_array().ok_or_else(|| TreeError::WrongType {
        path: path.to_string(),
        expected: "array",
        found: type_name(value),
    })
}

pub fn as_object<'a>(
    value: &'a Value,
    path: &str,
) -> Result<&'a serde_json::Map<String, Value>, TreeError> {
    value.as_object().ok_or_else(|| TreeError::WrongType {
        path: path.to_string(),
        expected: "object",
        found: type_name(value),
    })
}

/// Optional string field: absent or null maps to `None`, a non-string value is
/// still a type error.
pub fn opt_str<'a>(value: &'a Value, key: &str) -> Result<Option<&'a str>, TreeError> {
    match get(value, key) {
        Err(TreeError::Missing { .. }) => Ok(None),
        Err(e) => Err(e),
        Ok(Value::Null) => Ok(None),
        Ok(v) => as_str(v, key).map(Some),
    }
}

/// Optional array-of-strings field. Non-string elements are a type error; an
/// absent or null field maps to `None`.
pub fn opt_string_array(value: &Value, key: &str) -> Result<Option<Vec<String>>, TreeError> {
    let field = match get(value, key) {
        Err(TreeError::Missing { .. }) => return Ok(None),
        Err(e) => return Err(e),
        Ok(Value::Null) => return Ok(None),
        Ok(v) => v,
    };
    let items = as_array(field, key)?;
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        out.push(as_str(item, &format!("{}[{}]", key, idx))?.to_string());
    }
    Ok(Some(out))
}

/// Optional object field: absent or null maps to `None`.
pub fn opt_object<'a>(value: &'a Value, key: &str) -> Result<Option<&'a Value>, TreeError> {
    match get(value, key) {
        Err(TreeError::Missing { .. }) => Ok(None),
        Err(e) => Err(e),
        Ok(Value::Null) => Ok(None),
        Ok(v) => {
            as_object(v, key)?;
            Ok(Some(v))
        }
    }
}

/// Accept either an object or a single-element array wrapping an object.
/// Applied Terraform state renders nested blocks as arrays of objects, while
/// declaration text yields plain objects; both shapes mean the same thing here.
pub fn first_object(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(_) => Some(value),
        Value::Array(items) => items.first().filter(|v| v.is_object()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_wrong_type_are_distinct() {
        let doc = json!({ "DisplayName": 42 });

        assert_eq!(
            opt_str(&doc, "State"),
            Ok(None),
            "absent field should read as None"
        );
        match opt_str(&doc, "DisplayName") {
            Err(TreeError::WrongType {
                expected, found, ..
            }) => {
                assert_eq!(expected, "string");
                assert_eq!(found, "number");
            }
            other => panic!("expected WrongType, got {:?}", other),
        }
    }

    #[test]
    fn string_array_rejects_mixed_elements() {
        let doc = json!({ "IncludeUsers": ["All", 7] });
        assert!(opt_string_array(&doc, "IncludeUsers").is_err());
    }

    #[test]
    fn null_reads_as_absent() {
        let doc = json!({ "Conditions": null });
        assert_eq!(opt_object(&doc, "Conditions"), Ok(None));
    }

    #[test]
    fn first_object_unwraps_state_style_arrays() {
        let block = json!({ "operator": "OR" });
        let wrapped = json!([{ "operator": "OR" }]);
        assert_eq!(first_object(&block), Some(&block));
        assert_eq!(first_object(&wrapped), Some(&wrapped[0]));
        assert_eq!(first_object(&json!("nope")), None);
    }
}
