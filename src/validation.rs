//! Form input validation
//!
//! Turns raw form fields into a [`TransferRequest`] without touching the network.

use crate::error::ValidationError;

use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

lazy_static! {
    static ref ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address pattern");
    static ref DECIMAL: Regex =
        Regex::new(r"^([0-9]+\.?[0-9]*|\.[0-9]+)$").expect("valid decimal pattern");
}

/// Token selector value for the chain's native asset
pub const NATIVE_TOKEN: &str = "native";

/// Raw fields as posted by the transfer form.
///
/// JSON numbers are taken in their literal form so `"amount": 1.5` and
/// `"amount": "1.5"` mean the same thing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFields {
    #[serde(default, deserialize_with = "text_or_number")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub token_address: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub destination_address: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub max_gas: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Text(String),
    Number(serde_json::Number),
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<FieldValue>::deserialize(deserializer)?.map(|value| match value {
        FieldValue::Text(text) => text,
        FieldValue::Number(number) => number.to_string(),
    }))
}

/// Validated transfer parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount_decimal: String,
    /// `None` selects the native asset
    pub token_address: Option<Address>,
    pub destination_address: Address,
    pub max_gas_price_gwei: String,
}

/// Validate the submitted form
pub fn validate(raw: &FormFields) -> Result<TransferRequest, ValidationError> {
    let amount = required(&raw.amount, "amount")?;
    let token = required(&raw.token_address, "tokenAddress")?;
    let destination = required(&raw.destination_address, "destinationAddress")?;
    let max_gas = required(&raw.max_gas, "maxGas")?;

    if !is_decimal(amount) {
        return Err(ValidationError::InvalidAmount);
    }

    let destination_address = parse_address(destination)?;

    if !is_decimal(max_gas) {
        return Err(ValidationError::InvalidGasPrice);
    }

    let token_address = if token.eq_ignore_ascii_case(NATIVE_TOKEN) {
        None
    } else {
        let address = parse_address(token)?;
        (!address.is_zero()).then_some(address)
    };

    Ok(TransferRequest {
        amount_decimal: amount.to_string(),
        token_address,
        destination_address,
        max_gas_price_gwei: max_gas.to_string(),
    })
}

/// Check the `0x` + 40 hex digit shape and parse
pub fn parse_address(value: &str) -> Result<Address, ValidationError> {
    if !ADDRESS.is_match(value) {
        return Err(ValidationError::InvalidAddress);
    }
    value.parse().map_err(|_| ValidationError::InvalidAddress)
}

/// Non-negative decimal without sign or exponent
pub fn is_decimal(value: &str) -> bool {
    DECIMAL.is_match(value)
}

fn required<'a>(
    field: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, ValidationError> {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField(name)),
    }
}
