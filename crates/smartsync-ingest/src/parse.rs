//! Tolerant value coercion for semi-trusted feeds.
//!
//! Nothing here rejects input: unparseable numbers resolve to zero and
//! non-textual values resolve to `None`.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// Coerces an optional JSON value into a decimal.
///
/// Strings have every character outside `[0-9.-]` stripped before parsing, so
/// `"₹1,299.50"` becomes `1299.50`. Absent, null, boolean, or unparseable
/// values resolve to zero.
#[must_use]
pub fn coerce_decimal(value: Option<&Value>) -> Decimal {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(Decimal::from_f64))
            .unwrap_or(Decimal::ZERO),
        Some(Value::String(s)) => parse_numeric_text(s),
        _ => Decimal::ZERO,
    }
}

/// Parses free-form numeric text after stripping everything but digits, `.`
/// and `-`. Returns zero when nothing parseable remains.
#[must_use]
pub fn parse_numeric_text(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return Decimal::ZERO;
    }

    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Renders a scalar JSON value as trimmed text. Numbers keep their JSON
/// representation; blank strings, nulls, booleans, and containers yield `None`.
#[must_use]
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Interprets a loosely-typed flag: booleans, `1`/`0`, and common yes/no words.
#[must_use]
pub fn coerce_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "active" => Some(true),
            "false" | "no" | "n" | "0" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_currency_symbols_and_separators() {
        assert_eq!(parse_numeric_text("₹1,299.50"), Decimal::new(129_950, 2));
        assert_eq!(parse_numeric_text("$19.99 "), Decimal::new(1999, 2));
    }

    #[test]
    fn keeps_negative_sign() {
        assert_eq!(parse_numeric_text("-3"), Decimal::from(-3));
    }

    #[test]
    fn garbled_text_resolves_to_zero() {
        assert_eq!(parse_numeric_text("N/A"), Decimal::ZERO);
        assert_eq!(parse_numeric_text("1.2.3"), Decimal::ZERO);
        assert_eq!(parse_numeric_text("-"), Decimal::ZERO);
        assert_eq!(parse_numeric_text(""), Decimal::ZERO);
    }

    #[test]
    fn coerces_json_numbers() {
        assert_eq!(coerce_decimal(Some(&json!(50))), Decimal::from(50));
        assert_eq!(coerce_decimal(Some(&json!(19.99))), Decimal::new(1999, 2));
    }

    #[test]
    fn absent_and_non_numeric_values_are_zero() {
        assert_eq!(coerce_decimal(None), Decimal::ZERO);
        assert_eq!(coerce_decimal(Some(&Value::Null)), Decimal::ZERO);
        assert_eq!(coerce_decimal(Some(&json!(true))), Decimal::ZERO);
        assert_eq!(coerce_decimal(Some(&json!(["1"]))), Decimal::ZERO);
    }

    #[test]
    fn value_to_text_renders_scalars() {
        assert_eq!(value_to_text(&json!("  SKU001 ")).as_deref(), Some("SKU001"));
        assert_eq!(value_to_text(&json!(1042)).as_deref(), Some("1042"));
        assert_eq!(value_to_text(&json!("   ")), None);
        assert_eq!(value_to_text(&Value::Null), None);
    }

    #[test]
    fn coerce_flag_understands_common_spellings() {
        assert_eq!(coerce_flag(&json!(false)), Some(false));
        assert_eq!(coerce_flag(&json!("Yes")), Some(true));
        assert_eq!(coerce_flag(&json!(0)), Some(false));
        assert_eq!(coerce_flag(&json!("maybe")), None);
    }
}
