//! Money Module
//!
//! Every amount in the ledger is a `rust_decimal::Decimal` with at most
//! [`MONEY_SCALE`] fractional digits, matching the `NUMERIC(19,4)` columns.
//! Client-facing strings are parsed here and nowhere else.
//!
//! ## Rules
//! 1. No silent truncation: extra fractional digits are rejected, not rounded
//! 2. Transfer amounts are strictly positive
//! 3. Currency codes are three uppercase ASCII letters (ISO 4217 shape)
//!
//! ```rust
//! use transfer_ledger::money::{parse_amount, format_amount};
//!
//! let amount = parse_amount("100.5").unwrap();
//! assert_eq!(format_amount(amount), "100.50");
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits stored for every amount
pub const MONEY_SCALE: u32 = 4;

/// Largest value representable by `NUMERIC(19,4)` (15 integer digits)
const MAX_WHOLE_DIGITS: usize = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),
}

/// Parse a client amount string into a validated positive `Decimal`
///
/// Accepts `"100"`, `"100.5"`, `"0.0001"`. Rejects signs, `".5"`, `"5."`,
/// exponents and more than [`MONEY_SCALE`] fractional digits.
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((whole, frac)) => {
            if whole.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (whole, frac)
        }
    };

    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "non-digit character in amount: {}",
            amount_str
        )));
    }

    if whole.trim_start_matches('0').len() > MAX_WHOLE_DIGITS {
        return Err(MoneyError::Overflow);
    }

    let amount = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;

    validate_amount(amount)?;
    Ok(amount)
}

/// Validate an amount that already arrived as a `Decimal`
pub fn validate_amount(amount: Decimal) -> Result<(), MoneyError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: MONEY_SCALE,
        });
    }

    if normalized.trunc().abs().to_string().len() > MAX_WHOLE_DIGITS {
        return Err(MoneyError::Overflow);
    }

    Ok(())
}

/// Validate and normalise a currency code (`"usd"` -> `"USD"`)
pub fn parse_currency(code: &str) -> Result<String, MoneyError> {
    let code = code.trim();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(MoneyError::InvalidCurrency(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

/// Display an amount with at least two and at most [`MONEY_SCALE`] decimals
pub fn format_amount(value: Decimal) -> String {
    let normalized = value.normalize();
    let prec = normalized.scale().clamp(2, MONEY_SCALE) as usize;
    format!("{:.prec$}", normalized, prec = prec)
}
