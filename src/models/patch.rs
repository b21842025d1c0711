//! Lenient field deserializers for form-like JSON payloads

use serde::{Deserialize, Deserializer, de::DeserializeOwned, de::Error};
use serde_json::Value;

/// Three-state update field: absent leaves the value alone, `null` or an
/// empty string clears it, anything else replaces it.
pub fn patch_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Some(None)),
        Value::String(ref s) if s.trim().is_empty() => Ok(Some(None)),
        other => T::deserialize(coerce_numeric_string::<T>(other))
            .map(|v| Some(Some(v)))
            .map_err(D::Error::custom),
    }
}

/// Accepts `12.5` as well as `"12.5"`; empty strings become `None`
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_f64(&value).map_err(D::Error::custom)
}

/// Tags as a JSON array or a comma-separated string; no tag contains a comma
pub fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(tags_from_value(&value))
}

/// Same as [`tag_list`] with [`patch_field`] semantics
pub fn patch_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(tags_from_value(&value)))
}

pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => split_tags(s),
        // commas separate tags in storage, so an array entry may hold several
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(split_tags)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_f64(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("expected a number, got {other}")),
    }
}

// Forms send numbers as strings; only rewrite when the target is not a string
fn coerce_numeric_string<T: DeserializeOwned>(value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };
    if serde_json::from_value::<T>(value.clone()).is_ok() {
        return value;
    }
    let trimmed = s.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    match trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(number) => Value::Number(number),
        None => value,
    }
}
