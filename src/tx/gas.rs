//! Gas limits and fee fields for transfer transactions

use super::units::gwei_to_wei;
use crate::config::GasPriceStrategy;
use crate::error::PipelineResult;

use ethers::types::U256;

/// Gas used by a plain value transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Typical cost of an ERC-20 `transfer` before buffering
pub const TOKEN_TRANSFER_BASE_GAS: u64 = 65_000;

/// Fee fields of an unsigned transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl GasPrice {
    /// Highest price per gas unit the transaction can pay
    pub fn ceiling(&self) -> U256 {
        match self {
            GasPrice::Legacy(price) => *price,
            GasPrice::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// Computes conservative gas limits and fee fields without querying the chain
#[derive(Debug, Clone)]
pub struct GasEstimator {
    strategy: GasPriceStrategy,
    /// Tip in wei for EIP-1559 transactions
    priority_fee: U256,
    /// Buffer percentage for contract-call gas limits (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(strategy: GasPriceStrategy, priority_fee_gwei: &str) -> PipelineResult<Self> {
        Ok(Self {
            strategy,
            priority_fee: gwei_to_wei(priority_fee_gwei)?,
            gas_limit_buffer_percent: 20,
        })
    }

    /// Gas limit for a native-asset transfer
    pub fn native_transfer_limit(&self) -> U256 {
        U256::from(NATIVE_TRANSFER_GAS)
    }

    /// Gas limit for a token `transfer` call
    pub fn token_transfer_limit(&self) -> U256 {
        let base_gas = U256::from(TOKEN_TRANSFER_BASE_GAS);
        let buffer = base_gas * self.gas_limit_buffer_percent / 100;
        base_gas + buffer
    }

    /// Fee fields from the user's max gas price in gwei
    pub fn fee_fields(&self, max_gas_price_gwei: &str) -> PipelineResult<GasPrice> {
        let max_fee = gwei_to_wei(max_gas_price_gwei)?;

        Ok(match self.strategy {
            GasPriceStrategy::Legacy => GasPrice::Legacy(max_fee),
            GasPriceStrategy::Eip1559 => GasPrice::Eip1559 {
                max_fee_per_gas: max_fee,
                max_priority_fee_per_gas: std::cmp::min(self.priority_fee, max_fee),
            },
        })
    }

    /// Calculate total cost in wei, saturating at `U256::MAX`
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> U256 {
        gas_limit.saturating_mul(gas_price.ceiling())
    }
}
