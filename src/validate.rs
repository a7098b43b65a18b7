// src/validate.rs
use crate::error::TradeError;
use serde_json::Value;

/// Parses a requested share count. Accepts JSON integers and integer strings;
/// anything that is not a whole number greater than zero is rejected.
pub fn parse_quantity(raw: &Value) -> Result<i64, TradeError> {
    let shares = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match shares {
        Some(n) => ensure_positive(n),
        None => Err(TradeError::InvalidQuantity),
    }
}

pub fn ensure_positive(shares: i64) -> Result<i64, TradeError> {
    if shares > 0 {
        Ok(shares)
    } else {
        Err(TradeError::InvalidQuantity)
    }
}

/// Canonical ticker form: trimmed and upper-cased. Empty input is an unknown
/// symbol.
pub fn normalize_symbol(raw: &str) -> Result<String, TradeError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(TradeError::UnknownSymbol(symbol));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_positive_integers() {
        assert_eq!(parse_quantity(&json!(3)).unwrap(), 3);
        assert_eq!(parse_quantity(&json!("12")).unwrap(), 12);
        assert_eq!(parse_quantity(&json!(" 7 ")).unwrap(), 7);
    }

    #[test]
    fn rejects_zero_negative_and_non_integer_input() {
        for raw in [
            json!(0),
            json!(-3),
            json!("0"),
            json!("-3"),
            json!(2.5),
            json!("2.5"),
            json!("abc"),
            json!(""),
            json!(null),
            json!(true),
            json!([1]),
        ] {
            assert!(
                matches!(parse_quantity(&raw), Err(TradeError::InvalidQuantity)),
                "expected InvalidQuantity for {raw}"
            );
        }
    }

    #[test]
    fn symbols_are_upper_cased() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert!(matches!(
            normalize_symbol("   "),
            Err(TradeError::UnknownSymbol(_))
        ));
    }
}
