//! Raw response coercion and display classification.

use serde_json::{Number, Value};

/// How a raw response should be presented in a result block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLanguage {
    /// Parses as a JSON document that is not a bare number
    Json,
    /// A numeric literal
    Numeric,
    /// Anything else
    Plain,
}

impl DisplayLanguage {
    /// Classifies a raw response.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        match coerce(raw) {
            Value::Number(_) => Self::Numeric,
            Value::String(s) if s == raw => Self::Plain,
            _ => Self::Json,
        }
    }

    /// Returns the fence tag for this language.
    #[must_use]
    pub fn fence_tag(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Numeric => "number",
            Self::Plain => "text",
        }
    }
}

/// Coerces a raw response into a JSON value.
///
/// Tries a JSON document first, then a finite numeric literal, and falls
/// back to the raw string.
///
/// # Examples
///
/// ```
/// use codeloop::tracker::coerce;
/// use serde_json::json;
///
/// assert_eq!(coerce("42"), json!(42));
/// assert_eq!(coerce("{\"a\":1}"), json!({"a": 1}));
/// assert_eq!(coerce(" 1e3 "), json!(1000.0));
/// assert_eq!(coerce("hello"), json!("hello"));
/// ```
#[must_use]
pub fn coerce(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }

    let trimmed = raw.trim();
    if let Ok(number) = trimmed.parse::<f64>() {
        if let Some(number) = Number::from_f64(number) {
            return Value::Number(number);
        }
    }

    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_documents() {
        assert_eq!(coerce("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(coerce("[1, 2]"), json!([1, 2]));
        assert_eq!(coerce("true"), json!(true));
        assert_eq!(coerce("\"quoted\""), json!("quoted"));
    }

    #[test]
    fn numeric_literals_outside_json() {
        assert_eq!(coerce("+5"), json!(5.0));
        assert_eq!(coerce(".5"), json!(0.5));
    }

    #[test]
    fn non_finite_numbers_stay_strings() {
        assert_eq!(coerce("NaN"), json!("NaN"));
        assert_eq!(coerce("inf"), json!("inf"));
    }

    #[test]
    fn classification() {
        assert_eq!(DisplayLanguage::classify("4"), DisplayLanguage::Numeric);
        assert_eq!(DisplayLanguage::classify("-2.5"), DisplayLanguage::Numeric);
        assert_eq!(DisplayLanguage::classify("{\"ok\":true}"), DisplayLanguage::Json);
        assert_eq!(DisplayLanguage::classify("null"), DisplayLanguage::Json);
        assert_eq!(DisplayLanguage::classify("total: 4"), DisplayLanguage::Plain);
        assert_eq!(DisplayLanguage::classify(""), DisplayLanguage::Plain);
    }
}
