//! Shared input handling for tools: validate raw input against the tool's
//! schema, parse it into a typed struct, and wrap the outcome.
//!
//! Only the subset of JSON Schema the built-in tools use is checked:
//! object shape, `required`, per-property `type`, string `enum`, and
//! integer `minimum`/`maximum`.
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{ToolContext, ToolError, ToolResult};

pub fn validate_input(schema: &Value, input: &Value) -> Result<(), ToolError> {
    let obj = input
        .as_object()
        .ok_or_else(|| ToolError::InvalidInput(format!("expected a JSON object, got {input}")))?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            match obj.get(key) {
                None | Some(Value::Null) => {
                    return Err(ToolError::InvalidInput(format!(
                        "missing required parameter '{key}'"
                    )))
                }
                Some(_) => {}
            }
        }
    }

    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        if value.is_null() {
            continue;
        }
        let Some(prop) = props.get(key) else {
            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                return Err(ToolError::InvalidInput(format!("unknown parameter '{key}'")));
            }
            continue;
        };
        check_property(key, prop, value)?;
    }
    Ok(())
}

fn check_property(key: &str, prop: &Value, value: &Value) -> Result<(), ToolError> {
    if let Some(ty) = prop.get("type").and_then(Value::as_str) {
        let ok = match ty {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !ok {
            return Err(ToolError::InvalidInput(format!("parameter '{key}' must be of type {ty}")));
        }
    }
    if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(ToolError::InvalidInput(format!(
                "parameter '{key}' must be one of {}",
                Value::Array(allowed.clone())
            )));
        }
    }
    if let Some(n) = value.as_i64() {
        if let Some(min) = prop.get("minimum").and_then(Value::as_i64) {
            if n < min {
                return Err(ToolError::InvalidInput(format!("parameter '{key}' must be >= {min}")));
            }
        }
        if let Some(max) = prop.get("maximum").and_then(Value::as_i64) {
            if n > max {
                return Err(ToolError::InvalidInput(format!("parameter '{key}' must be <= {max}")));
            }
        }
    }
    Ok(())
}

/// Validate `input` against `schema`, then deserialize it.
pub fn parse_input<T: DeserializeOwned>(schema: &Value, input: Value) -> Result<T, ToolError> {
    validate_input(schema, &input)?;
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Fold a domain outcome into a [`ToolResult`].
pub fn wrap<T: Serialize>(outcome: Result<T, ToolError>) -> ToolResult {
    match outcome {
        Ok(value) => ToolResult::json(&value),
        Err(e) => ToolResult::err(e.to_string()),
    }
}

pub fn check_cancelled(ctx: &ToolContext) -> Result<(), ToolError> {
    if ctx.cancel.is_cancelled() {
        Err(ToolError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "difficulty": { "type": "integer", "minimum": 1, "maximum": 5 },
                "kind": { "type": "string", "enum": ["open", "choice"] }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_valid_input() {
        assert!(validate_input(&schema(), &json!({"name": "x", "difficulty": 3})).is_ok());
    }

    #[test]
    fn rejects_non_object() {
        let err = validate_input(&schema(), &json!("name")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn rejects_missing_and_null_required() {
        let err = validate_input(&schema(), &json!({})).unwrap_err();
        assert!(err.to_string().contains("'name'"), "{err}");
        assert!(validate_input(&schema(), &json!({"name": null})).is_err());
    }

    #[test]
    fn rejects_wrong_type_enum_and_range() {
        assert!(validate_input(&schema(), &json!({"name": 7})).is_err());
        assert!(validate_input(&schema(), &json!({"name": "x", "kind": "essay"})).is_err());
        assert!(validate_input(&schema(), &json!({"name": "x", "difficulty": 9})).is_err());
        assert!(validate_input(&schema(), &json!({"name": "x", "difficulty": 2.5})).is_err());
    }

    #[test]
    fn rejects_unknown_keys_when_closed() {
        let err = validate_input(&schema(), &json!({"name": "x", "extra": 1})).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn parse_input_yields_typed_struct() {
        #[derive(Deserialize)]
        struct Args {
            name: String,
            difficulty: Option<u8>,
        }
        let args: Args = parse_input(&schema(), json!({"name": "geo", "difficulty": 2})).unwrap();
        assert_eq!(args.name, "geo");
        assert_eq!(args.difficulty, Some(2));
    }

    #[test]
    fn wrap_maps_both_arms() {
        let ok = wrap(Ok::<_, ToolError>(json!({"a": 1})));
        assert!(ok.success);
        let err = wrap::<Value>(Err(ToolError::not_found("question", "q1")));
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("question not found: q1"));
    }

    #[test]
    fn check_cancelled_observes_token() {
        let ctx = ToolContext::new("u", CancellationToken::new());
        assert!(check_cancelled(&ctx).is_ok());
        ctx.cancel.cancel();
        assert!(matches!(check_cancelled(&ctx), Err(ToolError::Cancelled)));
    }
}
