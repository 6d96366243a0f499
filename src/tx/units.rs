//! Decimal string <-> smallest-unit integer conversion

use crate::error::{PipelineError, PipelineResult, ValidationError};
use crate::validation::is_decimal;

use ethers::types::U256;

/// Decimals of the native asset and the fallback for unknown tokens
pub const NATIVE_DECIMALS: u32 = 18;

/// Decimals between gwei and wei
pub const GWEI_DECIMALS: u32 = 9;

/// Largest precision whose scale factor `10^decimals` fits in 256 bits
pub const MAX_DECIMALS: u32 = 77;

/// Scale a decimal string by `10^decimals`.
///
/// Fractional digits beyond `decimals` are truncated.
pub fn to_smallest_unit(amount: &str, decimals: u32) -> PipelineResult<U256> {
    if !is_decimal(amount) {
        return Err(ValidationError::InvalidAmount.into());
    }

    let overflow = || PipelineError::AmountOverflow {
        amount: amount.to_string(),
        decimals,
    };

    if decimals > MAX_DECIMALS {
        return Err(overflow());
    }

    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    let fraction: String = fraction
        .chars()
        .chain(std::iter::repeat('0'))
        .take(decimals as usize)
        .collect();

    let digits = format!("{}{}", whole, fraction);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_dec_str(digits).map_err(|_| overflow())
}

/// Render a smallest-unit integer as a trimmed decimal string
pub fn format_units(value: U256, decimals: u32) -> String {
    let formatted = ethers::utils::format_units(value, decimals)
        .unwrap_or_else(|_| value.to_string());

    if !formatted.contains('.') {
        return formatted;
    }
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// Convert a gwei amount to wei
pub fn gwei_to_wei(gwei: &str) -> PipelineResult<U256> {
    to_smallest_unit(gwei, GWEI_DECIMALS).map_err(|e| match e {
        PipelineError::Validation(_) => ValidationError::InvalidGasPrice.into(),
        other => other,
    })
}
