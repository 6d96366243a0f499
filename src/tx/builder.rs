//! Unsigned transfer transaction assembly

use super::gas::{GasEstimator, GasPrice};
use super::units::{to_smallest_unit, NATIVE_DECIMALS};
use crate::chain::ChainContext;
use crate::error::PipelineResult;
use crate::validation::TransferRequest;

use ethers::abi::{self, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};
use sha3::{Digest, Keccak256};

/// A fully specified transaction awaiting a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub to: Address,
    /// Value in the smallest unit of the native asset
    pub value: U256,
    /// Empty for native transfers
    pub data: Bytes,
    pub nonce: u64,
    pub gas_limit: U256,
    pub fee: GasPrice,
}

impl UnsignedTransaction {
    /// Typed (legacy or EIP-1559) representation for signing
    pub fn to_typed(&self) -> TypedTransaction {
        match self.fee {
            GasPrice::Legacy(price) => TypedTransaction::Legacy(
                TransactionRequest::new()
                    .to(self.to)
                    .value(self.value)
                    .data(self.data.clone())
                    .nonce(self.nonce)
                    .gas(self.gas_limit)
                    .gas_price(price)
                    .chain_id(self.chain_id),
            ),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => TypedTransaction::Eip1559(
                Eip1559TransactionRequest::new()
                    .to(self.to)
                    .value(self.value)
                    .data(self.data.clone())
                    .nonce(self.nonce)
                    .gas(self.gas_limit)
                    .max_fee_per_gas(max_fee_per_gas)
                    .max_priority_fee_per_gas(max_priority_fee_per_gas)
                    .chain_id(self.chain_id),
            ),
        }
    }

    /// True when the transaction calls a token contract
    pub fn is_token_transfer(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Selector of `transfer(address,uint256)`
pub fn transfer_selector() -> [u8; 4] {
    let hash = Keccak256::digest(b"transfer(address,uint256)");
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for an ERC-20 `transfer(to, amount)`
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    let mut data = transfer_selector().to_vec();
    data.extend(abi::encode(&[Token::Address(to), Token::Uint(amount)]));
    data.into()
}

/// Builds unsigned transfers from validated requests and fresh chain context
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    gas: GasEstimator,
}

impl TransactionBuilder {
    pub fn new(gas: GasEstimator) -> Self {
        Self { gas }
    }

    /// Build the transfer described by `req`.
    ///
    /// `token_decimals` is only consulted for token transfers and falls back
    /// to 18 when the token's precision is unknown.
    pub fn build(
        &self,
        req: &TransferRequest,
        ctx: &ChainContext,
        token_decimals: Option<u32>,
    ) -> PipelineResult<UnsignedTransaction> {
        let fee = self.gas.fee_fields(&req.max_gas_price_gwei)?;

        let (to, value, data, gas_limit) = match req.token_address {
            None => (
                req.destination_address,
                to_smallest_unit(&req.amount_decimal, NATIVE_DECIMALS)?,
                Bytes::default(),
                self.gas.native_transfer_limit(),
            ),
            Some(token) => {
                let decimals = token_decimals.unwrap_or(NATIVE_DECIMALS);
                let amount = to_smallest_unit(&req.amount_decimal, decimals)?;
                (
                    token,
                    U256::zero(),
                    encode_transfer(req.destination_address, amount),
                    self.gas.token_transfer_limit(),
                )
            }
        };

        Ok(UnsignedTransaction {
            chain_id: ctx.chain_id,
            to,
            value,
            data,
            nonce: ctx.nonce,
            gas_limit,
            fee,
        })
    }
}
