//! Fixed-point token amounts.
//!
//! Balances carry sub-unit yield, so they are kept as deterministic
//! fixed-point numbers instead of floats. Whole units are what users stake,
//! unstake and withdraw; fractions only appear through yield carry.

use crate::error::LedgerError;
use fixed::types::I64F64;
use std::str::FromStr;

/// Token amount with 64 fractional bits.
pub type Amount = I64F64;

/// Tolerance for comparing amounts produced by proportional division.
pub const AMOUNT_TOLERANCE: Amount = I64F64::from_bits(1 << 24); // Approx 1e-12

/// Minutes in a 365-day year; annual rates are divided by this per tick.
pub const MINUTES_PER_YEAR: i128 = 365 * 24 * 60;

/// Largest balance or single amount the ledger accepts (10^15 tokens).
pub const MAX_AMOUNT: Amount = I64F64::from_bits(1_000_000_000_000_000i128 << 64);

#[inline]
pub fn zero() -> Amount {
    Amount::ZERO
}

/// True when the amount has no fractional part.
#[inline]
pub fn is_whole(amount: Amount) -> bool {
    amount.frac() == Amount::ZERO
}

/// Whole units contained in `amount` (floor for non-negative values).
#[inline]
pub fn whole_units(amount: Amount) -> Amount {
    amount.floor()
}

pub fn approx_eq(a: Amount, b: Amount) -> bool {
    (a - b).abs() <= AMOUNT_TOLERANCE
}

/// Checks that `amount` is a positive whole number of tokens.
pub fn ensure_positive_whole(amount: Amount) -> Result<(), LedgerError> {
    if amount <= Amount::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    if !is_whole(amount) {
        return Err(LedgerError::InvalidAmount(format!(
            "{} is not a whole number of tokens",
            amount
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::InvalidAmount(format!(
            "{} exceeds the maximum of {}",
            amount, MAX_AMOUNT
        )));
    }
    Ok(())
}

/// `balance + amount`, refusing results above [`MAX_AMOUNT`].
pub fn checked_credit(balance: Amount, amount: Amount) -> Result<Amount, LedgerError> {
    balance
        .checked_add(amount)
        .filter(|sum| *sum <= MAX_AMOUNT)
        .ok_or_else(|| {
            LedgerError::LimitExceeded(format!(
                "crediting {} to {} would exceed the maximum balance of {}",
                amount, balance, MAX_AMOUNT
            ))
        })
}

/// Parses user input such as `"25"` or `"3.5"`.
pub fn parse_amount(input: &str) -> Result<Amount, LedgerError> {
    Amount::from_str(input.trim())
        .map_err(|e| LedgerError::InvalidAmount(format!("'{}' is not a number: {}", input, e)))
}

/// Converts a configuration float, rejecting NaN, infinities and overflow.
pub fn from_f64(value: f64) -> Result<Amount, LedgerError> {
    Amount::checked_from_num(value)
        .filter(|_| value.is_finite())
        .ok_or_else(|| LedgerError::InvalidAmount(format!("{} is out of range", value)))
}

/// Human-readable rendering with a fixed number of decimals.
pub fn format_amount(amount: Amount, decimals: usize) -> String {
    format!("{:.*}", decimals, amount.to_num::<f64>())
}

/// Serde adapter storing amounts as exact decimal strings.
///
/// Deserialization also accepts plain JSON numbers so hand-edited or older
/// records keep loading.
pub mod serde_amount {
    use super::Amount;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a decimal string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            Amount::from_str(v.trim()).map_err(|e| E::custom(format!("invalid amount '{}': {}", v, e)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
            if !v.is_finite() {
                return Err(E::custom("amount must be finite"));
            }
            Amount::checked_from_num(v).ok_or_else(|| E::custom("amount out of range"))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            Amount::checked_from_num(v).ok_or_else(|| E::custom("amount out of range"))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Amount::checked_from_num(v).ok_or_else(|| E::custom("amount out of range"))
        }
    }
}
