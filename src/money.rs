//! Money Conversion Module
//!
//! Unified conversion between internal minor-unit representation and
//! client-facing decimal strings. All conversions MUST go through this
//! module.
//!
//! ## Design Principles
//! 1. Explicit Error Handling: No silent truncation
//! 2. Never floating point: `rust_decimal` for exact decimal math
//!
//! ## Internal Representation
//! - All amounts are stored as `u64` minor units
//! - The scale factor is `10^decimals` (e.g., 10^2 for rupee = paise)
//!
//! ## Usage
//! ```ignore
//! // Client sends "1.50"
//! let internal = parse_amount("1.50", 2)?;
//! assert_eq!(internal, 150);
//!
//! // Display balance to client
//! let display = format_amount(150, 2);
//! assert_eq!(display, "1.50");
//! ```

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use std::str::FromStr;
use thiserror::Error;

use crate::core_types::MinorUnits;

/// Money conversion errors
#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Convert a client decimal string to internal minor units.
///
/// # Arguments
/// * `amount_str` - Client-provided amount string (e.g., "1.50", "100")
/// * `decimals` - Configured decimal places of the currency
///
/// # Errors
/// * `PrecisionOverflow` - Input has more decimal places than allowed
/// * `InvalidAmount` - Amount is zero or negative
/// * `Overflow` - Result would overflow u64
/// * `InvalidFormat` - String format is invalid
pub fn parse_amount(amount_str: &str, decimals: u32) -> Result<MinorUnits, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    // Explicit signs are rejected: amounts are magnitudes, direction is
    // carried by the operation.
    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    // Strict check: require both sides of the dot to be non-empty.
    // This prevents ambiguous formats like ".5" or "5."
    if let Some((whole, frac)) = amount_str.split_once('.') {
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
        if frac.len() as u32 > decimals {
            return Err(MoneyError::PrecisionOverflow {
                provided: frac.len() as u32,
                max: decimals,
            });
        }
    }

    let value =
        Decimal::from_str(amount_str).map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;

    if value <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    let scale = Decimal::from(10u64.pow(decimals));
    let scaled = value.checked_mul(scale).ok_or(MoneyError::Overflow)?;

    // Precision was checked textually above; normalize() guards against
    // exotic Decimal representations slipping through.
    if scaled.normalize().scale() != 0 {
        return Err(MoneyError::PrecisionOverflow {
            provided: value.scale(),
            max: decimals,
        });
    }

    scaled.to_u64().ok_or(MoneyError::Overflow)
}

/// Format minor units as a decimal string with the full configured scale.
///
/// # Example
/// ```ignore
/// assert_eq!(format_amount(70000, 2), "700.00");
/// assert_eq!(format_amount(5, 2), "0.05");
/// ```
pub fn format_amount(value: MinorUnits, decimals: u32) -> String {
    Decimal::from_i128_with_scale(value as i128, decimals).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_number() {
        assert_eq!(parse_amount("100", 2).unwrap(), 10_000);
        assert_eq!(parse_amount("1", 2).unwrap(), 100);
    }

    #[test]
    fn test_parse_fractional() {
        assert_eq!(parse_amount("1.50", 2).unwrap(), 150);
        assert_eq!(parse_amount("1.5", 2).unwrap(), 150);
        assert_eq!(parse_amount("0.05", 2).unwrap(), 5);
    }

    #[test]
    fn test_parse_zero_decimals() {
        assert_eq!(parse_amount("42", 0).unwrap(), 42);
        assert!(parse_amount("4.2", 0).is_err());
    }

    #[test]
    fn test_parse_rejects_signs() {
        assert!(matches!(
            parse_amount("-5", 2),
            Err(MoneyError::InvalidAmount)
        ));
        assert!(matches!(
            parse_amount("+5", 2),
            Err(MoneyError::InvalidAmount)
        ));
    }

    #[test]
    fn test_parse_rejects_zero() {
        assert!(matches!(
            parse_amount("0", 2),
            Err(MoneyError::InvalidAmount)
        ));
        assert!(matches!(
            parse_amount("0.00", 2),
            Err(MoneyError::InvalidAmount)
        ));
    }

    #[test]
    fn test_parse_strict_dot_format() {
        assert!(matches!(
            parse_amount(".5", 2),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("5.", 2),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("", 2),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("abc", 2),
            Err(MoneyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_precision_overflow() {
        assert!(matches!(
            parse_amount("1.005", 2),
            Err(MoneyError::PrecisionOverflow { provided: 3, max: 2 })
        ));
    }

    #[test]
    fn test_parse_overflow() {
        // u64::MAX minor units is ~1.8e19
        assert!(matches!(
            parse_amount("99999999999999999999", 2),
            Err(MoneyError::Overflow)
        ));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_amount(70_000, 2), "700.00");
        assert_eq!(format_amount(150, 2), "1.50");
        assert_eq!(format_amount(5, 2), "0.05");
        assert_eq!(format_amount(0, 2), "0.00");
        assert_eq!(format_amount(42, 0), "42");
    }

    #[test]
    fn test_roundtrip_keeps_value() {
        let minor = parse_amount("123.45", 2).unwrap();
        assert_eq!(format_amount(minor, 2), "123.45");
    }
}
