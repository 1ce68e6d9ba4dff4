use crate::value::{Value, parse_datetime};
use std::cmp::Ordering;

/// Total coercing comparator used by the in-memory executor.
///
/// Ordering rules:
/// 1. Both sides numeric (or numeric-parseable text) compare as `f64`.
/// 2. Date/time against text compares as date/time when the text parses.
/// 3. Everything else compares by canonical text rendering.
///
/// `NaN` never arises from rule 1 against parsed input; a literal `NaN`
/// float falls through to the text rendering.
#[must_use]
pub fn coerced_cmp(left: &Value, right: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64())
        && let Some(ord) = a.partial_cmp(&b)
    {
        return ord;
    }

    if let Some(ord) = datetime_cmp(left, right) {
        return ord;
    }

    left.render_text().cmp(&right.render_text())
}

// Date/time comparison with opportunistic parsing of the text side.
fn datetime_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::Text(b)) => parse_datetime(b).map(|b| a.cmp(&b)),
        (Value::Text(a), Value::DateTime(b)) => parse_datetime(a).map(|a| a.cmp(b)),
        _ => None,
    }
}

///
/// TESTS
///
