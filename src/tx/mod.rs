//! Transaction construction with nonce bookkeeping and fee derivation

pub mod builder;
pub mod gas;
pub mod nonce;
pub mod signer;
pub mod units;

pub use builder::{TransactionBuilder, UnsignedTransaction};
pub use gas::{GasEstimator, GasPrice};
pub use nonce::{CommittedNonce, NonceManager, NonceReservation};
pub use signer::{sign, SignedTransaction};
