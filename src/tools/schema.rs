//! Restricted JSON-Schema subset used for handler input validation
//! (spec §4.11, §6): `type`, `properties`, `required`, `enum`, `minimum`,
//! `maximum`, `default`, `pattern`. No general-purpose JSON-Schema crate
//! is in the teacher's dependency table, and five keywords is too small a
//! surface to justify adding one.

use regex::Regex;
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Validates `args` against `schema`, returning an `InvalidArgument` error
/// naming every failing field (not just the first) so callers see the
/// complete picture in one round-trip.
pub fn validate(schema: &Value, args: &Value) -> Result<()> {
    let mut errors = Vec::new();
    validate_object(schema, args, "", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CacheError::invalid_argument(errors.join("; ")))
    }
}

fn validate_object(schema: &Value, args: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required {
            let Some(name) = name.as_str() else { continue };
            if args.get(name).is_none() {
                errors.push(format!("{}{name} is required", field_prefix(path)));
            }
        }
    }

    for (name, field_schema) in properties {
        let field_path = format!("{}{name}", field_prefix(path));
        let value = match args.get(name) {
            Some(v) => v,
            None => {
                if let Some(default) = field_schema.get("default") {
                    let _ = default;
                }
                continue;
            }
        };
        validate_field(field_schema, value, &field_path, errors);
    }
}

fn field_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}.")
    }
}

fn validate_field(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(expected_type) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected_type, value) {
            errors.push(format!("{path} must be of type {expected_type}"));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(format!("{path} must be one of {allowed:?}"));
        }
    }

    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if let Some(n) = value.as_f64() {
            if n < min {
                errors.push(format!("{path} must be >= {min}"));
            }
        }
    }

    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if let Some(n) = value.as_f64() {
            if n > max {
                errors.push(format!("{path} must be <= {max}"));
            }
        }
    }

    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        if let Some(s) = value.as_str() {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    errors.push(format!("{path} does not match pattern {pattern}"));
                }
                Err(e) => errors.push(format!("{path} has an invalid pattern: {e}")),
                _ => {}
            }
        }
    }

    if expected_type_is_object(schema) {
        validate_object(schema, value, path, errors);
    }
}

fn expected_type_is_object(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object") && schema.get("properties").is_some()
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Applies every `default` declared in `schema.properties` to `args` for
/// fields the caller omitted, in place.
pub fn apply_defaults(schema: &Value, args: &mut Value) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let Some(obj) = args.as_object_mut() else { return };
    for (name, field_schema) in properties {
        if !obj.contains_key(name) {
            if let Some(default) = field_schema.get("default") {
                obj.insert(name.clone(), default.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "pattern": "^[a-z]+$"},
                "count": {"type": "integer", "minimum": 1, "maximum": 10, "default": 1},
                "mode": {"type": "string", "enum": ["fast", "slow"]},
            },
            "required": ["name"],
        })
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = validate(&schema(), &json!({})).unwrap_err();
        assert!(format!("{err}").contains("name is required"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = validate(&schema(), &json!({"name": 5})).unwrap_err();
        assert!(format!("{err}").contains("type"));
    }

    #[test]
    fn out_of_range_number_is_rejected() {
        let err = validate(&schema(), &json!({"name": "abc", "count": 50})).unwrap_err();
        assert!(format!("{err}").contains("count"));
    }

    #[test]
    fn pattern_mismatch_is_rejected() {
        let err = validate(&schema(), &json!({"name": "ABC"})).unwrap_err();
        assert!(format!("{err}").contains("pattern"));
    }

    #[test]
    fn enum_violation_is_rejected() {
        let err = validate(&schema(), &json!({"name": "abc", "mode": "medium"})).unwrap_err();
        assert!(format!("{err}").contains("mode"));
    }

    #[test]
    fn valid_args_pass() {
        assert!(validate(&schema(), &json!({"name": "abc", "mode": "fast"})).is_ok());
    }

    #[test]
    fn defaults_are_applied_for_omitted_fields() {
        let mut args = json!({"name": "abc"});
        apply_defaults(&schema(), &mut args);
        assert_eq!(args["count"], json!(1));
    }

    #[test]
    fn multiple_failing_fields_are_all_named() {
        let err = validate(&schema(), &json!({"mode": "medium"})).unwrap_err();
        let message = format!("{err}");
        assert!(message.contains("name is required"));
        assert!(message.contains("mode"));
    }
}
