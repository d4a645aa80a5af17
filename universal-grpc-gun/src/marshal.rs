//! Conversion of untyped JSON payloads into messages of a schema resolved at runtime.
//!
//! The payload is first checked against the schema, which is where type strictness lives:
//! a string is never accepted for a 32-bit integer, float, double or bool, and integers must
//! fit their field. The message itself is then built by the proto3 JSON mapping of
//! `prost-reflect`, with unknown fields ignored.
//!
//! Coercions that remain, as the proto3 JSON mapping defines them:
//! - 64-bit integers also accept decimal strings
//! - float and double also accept `"NaN"`, `"Infinity"` and `"-Infinity"`
//! - enums accept a value name or a number
//! - bytes are base64 strings
//! - `null` leaves a field unset
//! - `google.protobuf.*` messages take their canonical JSON forms

use prost_reflect::{
    DeserializeOptions, DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, SerializeOptions,
};
use serde_json::Value;

use crate::error::MarshalError;

const ROOT: &str = "$";

/// Build a request message of `descriptor` from `payload`.
pub fn build(descriptor: &MessageDescriptor, payload: &Value) -> Result<DynamicMessage, MarshalError> {
    validate_message(descriptor, payload, ROOT)?;
    let options = DeserializeOptions::new().deny_unknown_fields(false);
    Ok(DynamicMessage::deserialize_with_options(descriptor.clone(), payload, &options)?)
}

/// Render a message as JSON, default valued fields included, keyed by proto field names.
pub fn read_back(message: &DynamicMessage) -> Result<Value, serde_json::Error> {
    let options = SerializeOptions::new().skip_default_fields(false).use_proto_field_name(true);
    message.serialize_with_options(serde_json::value::Serializer, &options)
}

pub fn validate_message(descriptor: &MessageDescriptor, value: &Value, path: &str) -> Result<(), MarshalError> {
    if descriptor.full_name().starts_with("google.protobuf.") {
        return Ok(());
    }
    let Value::Object(object) = value else {
        return Err(mismatch(path, "object", value));
    };
    for (key, value) in object {
        let Some(field) = descriptor.get_field_by_name(key).or_else(|| descriptor.get_field_by_json_name(key)) else {
            continue;
        };
        if !value.is_null() {
            validate_field(&field, value, &format!("{path}.{key}"))?;
        }
    }
    Ok(())
}

fn validate_field(field: &FieldDescriptor, value: &Value, path: &str) -> Result<(), MarshalError> {
    if field.is_map() {
        let Value::Object(entries) = value else {
            return Err(mismatch(path, "object", value));
        };
        let Kind::Message(entry) = field.kind() else {
            unreachable!("map field {} must be a message of entries", field.full_name())
        };
        let (key_kind, value_kind) = (entry.map_entry_key_field().kind(), entry.map_entry_value_field().kind());
        for (key, value) in entries {
            let entry_path = format!("{path}[{key:?}]");
            validate_map_key(&key_kind, key, &entry_path)?;
            if !value.is_null() {
                validate_kind(&value_kind, value, &entry_path)?;
            }
        }
        Ok(())
    } else if field.is_list() {
        let Value::Array(items) = value else {
            return Err(mismatch(path, "array", value));
        };
        let kind = field.kind();
        items.iter().enumerate().try_for_each(|(i, item)| validate_kind(&kind, item, &format!("{path}[{i}]")))
    } else {
        validate_kind(&field.kind(), value, path)
    }
}

fn validate_kind(kind: &Kind, value: &Value, path: &str) -> Result<(), MarshalError> {
    match kind {
        Kind::Double | Kind::Float => validate_float(kind, value, path),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            validate_integer(value, path, IntegerRange::new("int32", i32::MIN, i32::MAX, false))
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            validate_integer(value, path, IntegerRange::new("int64", i64::MIN, i64::MAX, true))
        }
        Kind::Uint32 | Kind::Fixed32 => validate_integer(value, path, IntegerRange::new("uint32", 0, u32::MAX, false)),
        Kind::Uint64 | Kind::Fixed64 => validate_integer(value, path, IntegerRange::new("uint64", 0, u64::MAX, true)),
        Kind::Bool => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(mismatch(path, "bool", value)),
        },
        Kind::String => match value {
            Value::String(_) => Ok(()),
            _ => Err(mismatch(path, "string", value)),
        },
        Kind::Bytes => match value {
            Value::String(_) => Ok(()),
            _ => Err(mismatch(path, "base64 string", value)),
        },
        Kind::Enum(descriptor) => match value {
            Value::String(name) if descriptor.get_value_by_name(name).is_some() => Ok(()),
            Value::String(name) => Err(MarshalError::InvalidValue {
                path: path.to_string(),
                reason: format!("{name} is not a value of enum {}", descriptor.full_name()),
            }),
            Value::Number(_) => validate_integer(value, path, IntegerRange::new("enum", i32::MIN, i32::MAX, false)),
            _ => Err(mismatch(path, "enum name or number", value)),
        },
        Kind::Message(descriptor) => validate_message(descriptor, value, path),
    }
}

fn validate_float(kind: &Kind, value: &Value, path: &str) -> Result<(), MarshalError> {
    match value {
        Value::Number(number) => {
            let v = number.as_f64().unwrap_or_default();
            if matches!(kind, Kind::Float) && v.is_finite() && v.abs() > f32::MAX as f64 {
                Err(MarshalError::OutOfRange { path: path.to_string(), value: number.to_string(), expected: "float" })
            } else {
                Ok(())
            }
        }
        Value::String(s) if matches!(s.as_str(), "NaN" | "Infinity" | "-Infinity") => Ok(()),
        _ => Err(mismatch(path, "number", value)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntegerRange {
    name: &'static str,
    min: i128,
    max: i128,
    decimal_string: bool,
}
impl IntegerRange {
    fn new<T: Into<i128>>(name: &'static str, min: T, max: T, decimal_string: bool) -> Self {
        Self { name, min: min.into(), max: max.into(), decimal_string }
    }
}

fn validate_integer(value: &Value, path: &str, range: IntegerRange) -> Result<(), MarshalError> {
    let parsed = match value {
        Value::Number(number) => match (number.as_i64(), number.as_u64()) {
            (Some(i), _) => i as i128,
            (None, Some(u)) => u as i128,
            (None, None) => return Err(mismatch(path, "integer", value)),
        },
        Value::String(s) if range.decimal_string => s.trim().parse::<i128>().map_err(|_| MarshalError::InvalidValue {
            path: path.to_string(),
            reason: format!("{s:?} is not a decimal {}", range.name),
        })?,
        _ if range.decimal_string => return Err(mismatch(path, "integer or decimal string", value)),
        _ => return Err(mismatch(path, "integer", value)),
    };
    if (range.min..=range.max).contains(&parsed) {
        Ok(())
    } else {
        Err(MarshalError::OutOfRange { path: path.to_string(), value: parsed.to_string(), expected: range.name })
    }
}

fn validate_map_key(kind: &Kind, key: &str, path: &str) -> Result<(), MarshalError> {
    match kind {
        Kind::String => Ok(()),
        Kind::Bool if matches!(key, "true" | "false") => Ok(()),
        Kind::Bool => Err(MarshalError::InvalidValue { path: path.to_string(), reason: "map key must be bool".into() }),
        // json object keys are strings, so integer keys are always decimal strings
        _ => validate_integer(&Value::String(key.to_string()), path, match kind {
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => IntegerRange::new("int32", i32::MIN, i32::MAX, true),
            Kind::Uint32 | Kind::Fixed32 => IntegerRange::new("uint32", 0, u32::MAX, true),
            Kind::Uint64 | Kind::Fixed64 => IntegerRange::new("uint64", 0, u64::MAX, true),
            _ => IntegerRange::new("int64", i64::MIN, i64::MAX, true),
        }),
    }
}

fn mismatch(path: &str, expected: &'static str, found: &Value) -> MarshalError {
    MarshalError::TypeMismatch { path: path.to_string(), expected, found: json_type(found) }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
