//! Conversion between user-facing decimal token amounts and smallest-denomination integers.

use alloy_primitives::{utils::parse_ether, U256};

use crate::error::AmountError;

pub const TOKEN_DECIMALS: usize = 18;
const UNITS_PER_TOKEN: u64 = 1_000_000_000_000_000_000;

/// Parses a non-negative decimal string ("2.5", "10", ".75") into smallest-denomination units.
pub fn parse_token_amount(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative);
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(AmountError::NotANumber(trimmed.to_string()));
    }
    if fraction.len() > TOKEN_DECIMALS {
        return Err(AmountError::TooPrecise {
            digits: fraction.len(),
        });
    }

    let whole_tokens = match whole {
        "" => U256::ZERO,
        digits => U256::from_str_radix(digits, 10).map_err(|_| AmountError::Overflow)?,
    };
    let raw = parse_ether(trimmed).map_err(|_| AmountError::Overflow)?;
    // Scaling by 10^18 wraps silently; an overflowed result no longer carries the whole part.
    if raw / U256::from(UNITS_PER_TOKEN) != whole_tokens {
        return Err(AmountError::Overflow);
    }
    Ok(raw)
}

/// Formats smallest-denomination units as a decimal string, always with at least one
/// fractional digit ("5.0", "2.5", "0.000000000000000001").
pub fn format_token_amount(raw: U256) -> String {
    let unit = U256::from(UNITS_PER_TOKEN);
    let whole = raw / unit;
    let fraction = format!("{:0>width$}", (raw % unit).to_string(), width = TOKEN_DECIMALS);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{fraction}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(whole: u64) -> U256 {
        U256::from(whole) * U256::from(UNITS_PER_TOKEN)
    }

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_token_amount("5").expect("parse"), tokens(5));
        assert_eq!(
            parse_token_amount("2.5").expect("parse"),
            U256::from(2_500_000_000_000_000_000u64)
        );
        assert_eq!(
            parse_token_amount(".75").expect("parse"),
            U256::from(750_000_000_000_000_000u64)
        );
        assert_eq!(parse_token_amount("3.").expect("parse"), tokens(3));
        assert_eq!(
            parse_token_amount("0.000000000000000001").expect("parse"),
            U256::from(1u8)
        );
        assert_eq!(parse_token_amount(" 1 ").expect("parse"), tokens(1));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert_eq!(parse_token_amount(""), Err(AmountError::Empty));
        assert_eq!(parse_token_amount("   "), Err(AmountError::Empty));
        assert_eq!(parse_token_amount("-1"), Err(AmountError::Negative));
        assert_eq!(
            parse_token_amount("0.0000000000000000001"),
            Err(AmountError::TooPrecise { digits: 19 })
        );
        for input in ["abc", ".", "1.2.3", "+1", "1e18", "0x10", "1,5"] {
            assert!(
                matches!(parse_token_amount(input), Err(AmountError::NotANumber(_))),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_amounts_beyond_256_bits() {
        let too_big = format!("{}0", U256::MAX);
        assert_eq!(parse_token_amount(&too_big), Err(AmountError::Overflow));

        // Fits in 256 bits as a whole number but not once scaled to 18 decimals.
        let max_whole = U256::MAX / U256::from(UNITS_PER_TOKEN);
        for input in [
            format!("{}", max_whole + U256::from(1u8)),
            format!("{max_whole}.9"),
        ] {
            assert_eq!(parse_token_amount(&input), Err(AmountError::Overflow), "{input}");
        }
        assert!(parse_token_amount(&format!("{max_whole}.5")).is_ok());
    }

    #[test]
    fn formats_like_ether_strings() {
        assert_eq!(format_token_amount(U256::ZERO), "0.0");
        assert_eq!(format_token_amount(tokens(5)), "5.0");
        assert_eq!(
            format_token_amount(U256::from(2_500_000_000_000_000_000u64)),
            "2.5"
        );
        assert_eq!(format_token_amount(U256::from(1u8)), "0.000000000000000001");
    }

    #[test]
    fn decimal_values_survive_conversion() {
        for input in ["0", "5", "2.5", "0.1", "123456789.000000000000000001", "7.25"] {
            let raw = parse_token_amount(input).expect("parse");
            let formatted = format_token_amount(raw);
            assert_eq!(parse_token_amount(&formatted).expect("reparse"), raw);
        }
        assert_eq!(format_token_amount(parse_token_amount("2.50").expect("parse")), "2.5");

        let formatted = format_token_amount(U256::MAX);
        assert_eq!(parse_token_amount(&formatted).expect("reparse"), U256::MAX);
    }
}
