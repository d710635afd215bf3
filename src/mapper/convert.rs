//! JSON leaf to wire-value conversion.
//!
//! Every cell crossing the connection boundary goes through these two
//! functions, guided by the column's logical type and the dialect's
//! uuid/datetime codecs.

use chrono::{DateTime, Utc};
use serde_json::{Number, Value as JsonValue};
use uuid::Uuid;

use crate::core::{ScalarType, StoreError, StoreResult, Value};
use crate::dialect::Dialect;

pub fn json_to_value(
    dialect: &dyn Dialect,
    scalar: ScalarType,
    json: &JsonValue,
) -> StoreResult<Value> {
    match (json, scalar) {
        (JsonValue::Null, _) => Ok(Value::Null),
        (JsonValue::Bool(b), ScalarType::Bool) => Ok(Value::Boolean(*b)),
        (JsonValue::Number(n), ScalarType::Int) => n.as_i64().map(Value::Integer).ok_or_else(|| {
            StoreError::Serialization(format!("cannot represent {} as a 64-bit integer", n))
        }),
        (JsonValue::Number(n), ScalarType::Double) => {
            n.as_f64().map(Value::Float).ok_or_else(|| {
                StoreError::Serialization(format!("cannot represent {} as a double", n))
            })
        }
        (JsonValue::String(s), ScalarType::String) => Ok(Value::Text(s.clone())),
        (JsonValue::String(s), ScalarType::DateTime) => DateTime::parse_from_rfc3339(s)
            .map(|ts| dialect.encode_date_time(ts.with_timezone(&Utc)))
            .map_err(|err| StoreError::Serialization(format!("invalid datetime '{}': {}", s, err))),
        (JsonValue::String(s), ScalarType::Uuid) => Uuid::parse_str(s)
            .map(|uuid| dialect.encode_uuid(uuid))
            .map_err(|err| StoreError::Serialization(format!("invalid uuid '{}': {}", s, err))),
        (other, expected) => Err(StoreError::Serialization(format!(
            "cannot convert {} to {}",
            other, expected
        ))),
    }
}

pub fn value_to_json(
    dialect: &dyn Dialect,
    scalar: ScalarType,
    value: &Value,
) -> StoreResult<JsonValue> {
    if value.is_null() {
        return Ok(JsonValue::Null);
    }

    match scalar {
        ScalarType::String => match value {
            Value::Text(s) => Ok(JsonValue::String(s.clone())),
            other => Err(mismatch(scalar, other)),
        },
        ScalarType::Int => match value {
            Value::Integer(i) => Ok(JsonValue::from(*i)),
            other => Err(mismatch(scalar, other)),
        },
        ScalarType::Double => match value {
            Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number).ok_or_else(|| {
                StoreError::Serialization(format!("non-finite double {} cannot be mapped", f))
            }),
            Value::Integer(i) => Ok(JsonValue::from(*i as f64)),
            other => Err(mismatch(scalar, other)),
        },
        ScalarType::Bool => match value {
            Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
            // some backends surface booleans as 0/1
            Value::Integer(i) => Ok(JsonValue::Bool(*i != 0)),
            other => Err(mismatch(scalar, other)),
        },
        ScalarType::DateTime => {
            let ts = dialect.decode_date_time(value)?;
            Ok(JsonValue::String(ts.to_rfc3339()))
        }
        ScalarType::Uuid => {
            let uuid = dialect.decode_uuid(value)?;
            Ok(JsonValue::String(uuid.to_string()))
        }
    }
}

fn mismatch(expected: ScalarType, got: &Value) -> StoreError {
    StoreError::Serialization(format!(
        "column of type {} cannot hold a {} value",
        expected,
        got.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GenericDialect;
    use serde_json::json;

    #[test]
    fn test_scalar_roundtrips() {
        let dialect = GenericDialect::new();

        let encoded = json_to_value(&dialect, ScalarType::Int, &json!(42)).unwrap();
        assert_eq!(encoded, Value::Integer(42));
        assert_eq!(
            value_to_json(&dialect, ScalarType::Int, &encoded).unwrap(),
            json!(42)
        );

        let encoded = json_to_value(&dialect, ScalarType::Bool, &json!(true)).unwrap();
        assert_eq!(
            value_to_json(&dialect, ScalarType::Bool, &encoded).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_uuid_roundtrip() {
        let dialect = GenericDialect::new();
        let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";

        let encoded = json_to_value(&dialect, ScalarType::Uuid, &json!(raw)).unwrap();
        assert_eq!(
            value_to_json(&dialect, ScalarType::Uuid, &encoded).unwrap(),
            json!(raw)
        );
    }

    #[test]
    fn test_null_passes_through() {
        let dialect = GenericDialect::new();
        assert_eq!(
            json_to_value(&dialect, ScalarType::String, &JsonValue::Null).unwrap(),
            Value::Null
        );
        assert_eq!(
            value_to_json(&dialect, ScalarType::String, &Value::Null).unwrap(),
            JsonValue::Null
        );
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let dialect = GenericDialect::new();
        let err = json_to_value(&dialect, ScalarType::Int, &json!("nope")).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
