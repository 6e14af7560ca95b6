//! Gremlin-Groovy literal rendering.

use crate::element::{ElementId, Value};
use crate::error::{MapperError, Result};

/// Quotes `text` as a single-quoted Groovy string.
///
/// Backslashes, single quotes and line breaks are escaped; single-quoted
/// Groovy strings cannot span lines.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Renders an element id.
pub fn id(id: &ElementId) -> String {
    match id {
        ElementId::String(s) => quote(s),
        ElementId::Long(i) => i.to_string(),
    }
}

/// Renders a property value.
///
/// Temporal values become quoted ISO text. Non-finite floats have no literal
/// form and are rejected.
pub fn property_value(property: &str, value: &Value) -> Result<String> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(MapperError::InvalidPropertyValue {
            property: property.to_owned(),
            reason: format!("{f} has no script literal"),
        }),
        other => Ok(value_text(other)),
    }
}

/// Renders a value without validation; used for bound query parameters.
///
/// Non-finite floats render as the matching `Double` constants.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_nan() => "Double.NaN".to_owned(),
        Value::Float(f) if f.is_infinite() && f.is_sign_positive() => "Double.POSITIVE_INFINITY".to_owned(),
        Value::Float(f) if f.is_infinite() => "Double.NEGATIVE_INFINITY".to_owned(),
        Value::Float(f) => format!("{f:?}"),
        Value::String(s) => quote(s),
        temporal => quote(&temporal.to_text().unwrap_or_default()),
    }
}

/// `.property('key', value)` step.
pub fn property_step(key: &str, value: &Value) -> Result<String> {
    Ok(format!(".property({}, {})", quote(key), property_value(key, value)?))
}
