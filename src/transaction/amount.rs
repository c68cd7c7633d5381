//! Conversion between human decimal amounts and integer base units.
//!
//! `base = round(amount * 10^decimals)`, rounding half away from zero.
//! Precision below one base unit is lost; callers never retry with a
//! different value.

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Decimals of every EVM native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest mantissa a `Decimal` can hold (96 bits).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;
/// Largest scale a `Decimal` can hold.
const MAX_SCALE: u32 = 28;

/// Convert a positive human amount to base units.
///
/// Fails with `InvalidAmount` for zero or negative amounts, amounts that
/// round to zero and results that do not fit in 256 bits.
pub fn to_base_units(amount: Decimal, decimals: u8) -> OrchestratorResult<U256> {
    if amount <= Decimal::ZERO {
        return Err(OrchestratorError::InvalidAmount(format!("{amount} must be greater than zero")));
    }

    let mantissa = amount.mantissa().unsigned_abs();
    let scale = amount.scale();
    let decimals = u32::from(decimals);

    let base = if decimals >= scale {
        U256::from(10u64)
            .checked_pow(U256::from(decimals - scale))
            .and_then(|factor| U256::from(mantissa).checked_mul(factor))
            .ok_or_else(|| OrchestratorError::InvalidAmount(format!("{amount} overflows 256 bits")))?
    } else {
        // scale <= 28, so the divisor fits in a u128
        let divisor = 10u128.pow(scale - decimals);
        let quotient = mantissa / divisor;
        let remainder = mantissa % divisor;
        let rounded = if remainder * 2 >= divisor { quotient + 1 } else { quotient };
        U256::from(rounded)
    };

    if base.is_zero() {
        return Err(OrchestratorError::InvalidAmount(format!(
            "{amount} is below the smallest unit at {decimals} decimals"
        )));
    }
    Ok(base)
}

/// Base units for an ERC-20 allowance. Unlike transfers, zero is allowed
/// and revokes the allowance.
pub fn allowance_units(amount: Decimal, decimals: u8) -> OrchestratorResult<U256> {
    if amount.is_zero() {
        return Ok(U256::ZERO);
    }
    to_base_units(amount, decimals)
}

/// Convert base units back to a human amount.
///
/// Digits beyond what a `Decimal` can hold are truncated; values too large
/// for a `Decimal` fail with `InvalidAmount`.
pub fn from_base_units(value: U256, decimals: u8) -> OrchestratorResult<Decimal> {
    let ten = U256::from(10u64);
    let mut value = value;
    let mut scale = u32::from(decimals);

    while scale > MAX_SCALE {
        value /= ten;
        scale -= 1;
    }
    while value > U256::from(MAX_MANTISSA) && scale > 0 {
        value /= ten;
        scale -= 1;
    }

    let mantissa = u128::try_from(value)
        .ok()
        .filter(|m| *m <= MAX_MANTISSA)
        .ok_or_else(|| OrchestratorError::InvalidAmount(format!("{value} base units do not fit a decimal")))?;

    // Mantissa is at most 96 bits, so the i128 cast is lossless
    Ok(Decimal::from_i128_with_scale(mantissa as i128, scale).normalize())
}

/// Human rendering of a base-unit amount, falling back to the raw integer.
pub fn format_units(value: U256, decimals: u8) -> String {
    match from_base_units(value, decimals) {
        Ok(amount) => amount.to_string(),
        Err(_) => format!("{value} (base units)"),
    }
}

/// Whole number of base units, rejecting fractions.
pub fn whole_units(amount: Decimal) -> OrchestratorResult<U256> {
    if !amount.fract().is_zero() {
        return Err(OrchestratorError::InvalidAmount(format!(
            "{amount} is not a whole number of units"
        )));
    }
    to_base_units(amount, 0)
}
