mod compare;

pub use compare::coerced_cmp;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

///
/// Value
///
/// Typed scalar carried by comparisons, embedded options, and cursors.
/// The parser emits the narrowest fitting variant; `List` appears only as
/// the operand of `In`/`NotIn` and may be empty.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    /// Variant label used in diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "datetime",
            Self::List(_) => "list",
        }
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Numeric reading of this value, if one exists.
    ///
    /// Text parses opportunistically so that string-typed backends can still
    /// order numerically.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Bool(_) | Self::DateTime(_) | Self::List(_) => None,
        }
    }

    /// Canonical text rendering used by string operators against
    /// non-text values.
    #[must_use]
    pub fn render_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt) => dt.to_rfc3339(),
            Self::List(items) => items
                .iter()
                .map(Self::render_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

// Accepted date/time lexeme formats, tried after RFC 3339.
const NAIVE_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d-%H%M"];

/// Parse a date/time lexeme against the accepted formats.
///
/// Tried in order: RFC 3339, `YYYY-MM-DDThh:mm:ss`, `YYYY-MM-DD hh:mm:ss`,
/// `YYYY-MM-DD-HHMM`, `YYYY-MM-DD`. Naive forms are taken as UTC.
#[must_use]
pub fn parse_datetime(lexeme: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(lexeme) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(lexeme, format) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(lexeme, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}

///
/// TESTS
///
