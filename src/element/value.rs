//! Canonical scalar value representation shared by the converter, the script
//! generator and the result readers.

use std::fmt;

use serde_json::{Number, Value as JsonValue};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

use crate::error::{MapperError, Result};

/// Property value carried by a graph element.
///
/// Temporal variants never reach the wire as native literals; they are
/// rendered through [`Value::to_text`] in their ISO-8601 local form.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Calendar date without zone (`2024-05-01`).
    Date(Date),
    /// Wall clock time without zone (`10:15:30`).
    Time(Time),
    /// Local date and time without zone (`2024-05-01T10:15:30`).
    DateTime(PrimitiveDateTime),
}

impl Value {
    /// Short runtime type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrows the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical textual form for strings and temporal values.
    ///
    /// Numbers and booleans return their literal text; null returns `None`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(format!("{f:?}")),
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(format_date(*d)),
            Value::Time(t) => Some(format_time(*t)),
            Value::DateTime(dt) => Some(format_date_time(*dt)),
        }
    }

    /// Converts a decoded JSON payload into a scalar value.
    ///
    /// Arrays and objects are kept as their serialized JSON text, which is how
    /// complex properties are stored on the server.
    pub fn from_json(value: &JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    /// Converts the value into JSON; temporal values become ISO strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(_) | Value::Time(_) | Value::DateTime(_) => {
                JsonValue::String(self.to_text().unwrap_or_default())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("null"),
        }
    }
}

fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

fn format_time(time: Time) -> String {
    let rendered = if time.nanosecond() == 0 {
        time.format(format_description!("[hour]:[minute]:[second]"))
    } else {
        time.format(format_description!("[hour]:[minute]:[second].[subsecond]"))
    };
    rendered.unwrap_or_else(|_| time.to_string())
}

fn format_date_time(value: PrimitiveDateTime) -> String {
    format!("{}T{}", format_date(value.date()), format_time(value.time()))
}

/// Parses an ISO-8601 local date (`2024-05-01`).
pub fn parse_date(property: &str, text: &str) -> Result<Date> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .map_err(|err| temporal_error(property, text, err))
}

/// Parses an ISO-8601 local time, with or without fractional seconds.
pub fn parse_time(property: &str, text: &str) -> Result<Time> {
    Time::parse(text, format_description!("[hour]:[minute]:[second].[subsecond]"))
        .or_else(|_| Time::parse(text, format_description!("[hour]:[minute]:[second]")))
        .or_else(|_| Time::parse(text, format_description!("[hour]:[minute]")))
        .map_err(|err| temporal_error(property, text, err))
}

/// Parses an ISO-8601 local date-time (`2024-05-01T10:15:30[.fff]`).
pub fn parse_date_time(property: &str, text: &str) -> Result<PrimitiveDateTime> {
    let (date, time) = text.split_once('T').ok_or_else(|| MapperError::InvalidPropertyValue {
        property: property.to_owned(),
        reason: format!("'{text}' is not an ISO-8601 local date-time"),
    })?;
    Ok(PrimitiveDateTime::new(
        parse_date(property, date)?,
        parse_time(property, time)?,
    ))
}

fn temporal_error(property: &str, text: &str, err: time::error::Parse) -> MapperError {
    MapperError::InvalidPropertyValue {
        property: property.to_owned(),
        reason: format!("cannot parse '{text}': {err}"),
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Value::Date(value)
    }
}

impl From<Time> for Value {
    fn from(value: Time) -> Self {
        Value::Time(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn temporal_values_render_as_iso_text() {
        assert_eq!(Value::from(date!(2024 - 05 - 01)).to_text().as_deref(), Some("2024-05-01"));
        assert_eq!(Value::from(time!(10:15:30)).to_text().as_deref(), Some("10:15:30"));
        assert_eq!(
            Value::from(datetime!(2024-05-01 10:15:30)).to_text().as_deref(),
            Some("2024-05-01T10:15:30")
        );
    }

    #[test]
    fn temporal_text_parses_back() {
        let parsed = parse_date_time("createdAt", "2024-05-01T10:15:30.25").expect("parse");
        assert_eq!(parsed, datetime!(2024-05-01 10:15:30.25));
        assert_eq!(parse_time("at", "08:30").expect("parse"), time!(08:30));
        assert!(parse_date("day", "01/05/2024").is_err());
    }

    #[test]
    fn json_numbers_split_into_int_and_float() {
        assert_eq!(Value::from_json(&serde_json::json!(42)), Value::Int(42));
        assert_eq!(Value::from_json(&serde_json::json!(4.5)), Value::Float(4.5));
        assert_eq!(
            Value::from_json(&serde_json::json!({"a": 1})),
            Value::String("{\"a\":1}".into())
        );
    }
}
