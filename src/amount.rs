//! Token amount conversions
//!
//! Balances and message amounts travel as integer strings in the token's
//! native unit (exponent 18). Distribution queries (rewards, commission,
//! delegation shares) report `Dec` values whose integer encoding carries a
//! further 18 digits (exponent 36). Everything in between is exact
//! `Decimal` arithmetic in whole-token units; rounding happens only in
//! [`display`].
//!
//! `Decimal` holds at most 28 fractional digits, so the extra precision of
//! a 36-exponent value is truncated to the native exponent on the way in.
//! Anything finer than one native unit cannot be withdrawn anyway.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};

/// Exponent of the token's integer base unit
pub const NATIVE_EXPONENT: u32 = 18;

/// Exponent of the integer encoding used for `Dec` query results
pub const DEC_EXPONENT: u32 = 36;

/// Fractional digits shown in logs
pub const DISPLAY_DECIMALS: u32 = 4;

/// Parse an integer amount in native units into whole tokens
pub fn from_native_units(raw: &str) -> Result<Decimal> {
    shift_down(raw, NATIVE_EXPONENT)
}

/// Parse a 36-exponent `Dec` integer encoding into whole tokens
pub fn from_dec_units(raw: &str) -> Result<Decimal> {
    shift_down(raw, DEC_EXPONENT)
}

/// Move the decimal point of an unsigned integer string `exponent` places left
pub fn shift_down(raw: &str, exponent: u32) -> Result<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Amount(format!("not an unsigned integer: {:?}", raw)));
    }

    let scale = exponent.min(NATIVE_EXPONENT);
    let dropped = (exponent - scale) as usize;
    let kept = if raw.len() > dropped {
        &raw[..raw.len() - dropped]
    } else {
        "0"
    };

    let mantissa: i128 = kept
        .parse()
        .map_err(|e| Error::Amount(format!("{}: {}", raw, e)))?;

    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| Error::Amount(format!("{} out of range: {}", raw, e)))
}

/// Integer native-unit string for a token amount (truncated toward zero)
pub fn to_native_units(amount: Decimal) -> Result<String> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::Amount(format!("negative amount: {}", amount)));
    }

    let truncated = amount.round_dp_with_strategy(NATIVE_EXPONENT, RoundingStrategy::ToZero);
    let factor = 10i128.pow(NATIVE_EXPONENT - truncated.scale());

    truncated
        .mantissa()
        .checked_mul(factor)
        .map(|units| units.to_string())
        .ok_or_else(|| Error::Amount(format!("amount too large: {}", amount)))
}

/// Whole-token value of a native-unit integer
pub fn native_units_to_decimal(units: u128) -> Result<Decimal> {
    from_native_units(&units.to_string())
}

/// Half-up rounding to four digits, trailing zeros stripped
pub fn display(amount: Decimal) -> String {
    amount
        .round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}
