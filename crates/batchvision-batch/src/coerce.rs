use serde_json::{Map, Value};

use batchvision_core::error::{FieldError, ValidationError};
use batchvision_core::job::{Extraction, FieldValue};
use batchvision_core::schema::{PropertyType, Schema};

/// Checks a raw response against the schema and coerces every declared
/// property to its type.
///
/// A missing or unusable required field fails the whole item. An optional
/// field that cannot be coerced is recorded as a field error and the rest
/// of the response still counts. Undeclared fields pass through untouched.
pub fn validate_response(
    schema: &Schema,
    raw: &Map<String, Value>,
) -> Result<Extraction, ValidationError> {
    let mut extraction = Extraction::new();

    for (name, property) in schema.properties.iter() {
        let required = schema.is_required(name);
        let value = match raw.get(name) {
            None | Some(Value::Null) if required => {
                return Err(ValidationError::MissingRequired {
                    field: name.to_string(),
                });
            }
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };

        match coerce_field(name, property.kind, value) {
            Ok(coerced) => extraction.insert_field(name, coerced),
            Err(err) if required => {
                return Err(ValidationError::InvalidRequired {
                    field: name.to_string(),
                    reason: err.to_string(),
                });
            }
            Err(err) => extraction.insert_error(name, err.to_string()),
        }
    }

    for (name, value) in raw {
        if !schema.properties.contains(name) {
            extraction.insert_field(name.clone(), FieldValue::Other(value.clone()));
        }
    }

    if extraction.fields().is_empty() {
        return Err(ValidationError::NoUsableFields);
    }
    Ok(extraction)
}

pub fn coerce_field(name: &str, kind: PropertyType, value: &Value) -> Result<FieldValue, FieldError> {
    match kind {
        PropertyType::Number => coerce_number(name, value),
        PropertyType::Boolean => coerce_boolean(name, value),
        PropertyType::String => Ok(FieldValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
    }
}

fn coerce_number(name: &str, value: &Value) -> Result<FieldValue, FieldError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            parse_leading_number(&cleaned)
        }
        _ => {
            return Err(FieldError::NotANumber {
                field: name.to_string(),
            })
        }
    };

    parsed
        .filter(|n| n.is_finite())
        .map(FieldValue::Number)
        .ok_or_else(|| FieldError::InvalidNumber {
            field: name.to_string(),
        })
}

/// Parses the longest numeric prefix, so `"12.50."` reads as 12.5 and
/// `"1.2.3"` as 1.2. Input is already reduced to digits, `.` and `-`.
fn parse_leading_number(cleaned: &str) -> Option<f64> {
    let bytes = cleaned.as_bytes();
    let mut end = usize::from(bytes.first() == Some(&b'-'));
    let mut seen_digit = false;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }
    cleaned[..end].parse().ok()
}

/// Accepts real booleans and the strings "true"/"false", ignoring case and
/// surrounding whitespace.
fn coerce_boolean(name: &str, value: &Value) -> Result<FieldValue, FieldError> {
    match value {
        Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(FieldValue::Boolean(true)),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(FieldValue::Boolean(false)),
        Value::String(_) => Err(FieldError::InvalidBoolean {
            field: name.to_string(),
        }),
        _ => Err(FieldError::NotABoolean {
            field: name.to_string(),
        }),
    }
}
