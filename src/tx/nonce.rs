//! Nonce bookkeeping for transactions held by the relay
//!
//! The relay may keep a signed transaction for a long time before the gas
//! price drops below its threshold, so the chain's pending count does not
//! move. The ledger remembers nonces consumed by accepted submissions and
//! hands out the next free one on top of the on-chain count.

use dashmap::DashMap;
use ethers::types::Address;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

type AccountKey = (u64, Address);

/// Per-account nonce state
#[derive(Debug, Default)]
struct AccountNonceState {
    /// One past the highest nonce the relay accepted
    floor: u64,
    /// Nonces handed to in-progress attempts
    reserved: BTreeSet<u64>,
}

/// Tracks nonces across attempts for every (chain, account) pair
#[derive(Debug, Clone, Default)]
pub struct NonceManager {
    accounts: Arc<DashMap<AccountKey, AccountNonceState>>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce given the freshly fetched on-chain count
    pub fn reserve(&self, chain_id: u64, account: Address, on_chain: u64) -> NonceReservation {
        let mut state = self.accounts.entry((chain_id, account)).or_default();

        if on_chain > state.floor {
            if state.floor > 0 {
                debug!(chain_id, %account, on_chain, floor = state.floor, "Chain caught up with relayed nonces");
            }
            state.floor = on_chain;
        }

        let mut nonce = state.floor;
        while state.reserved.contains(&nonce) {
            nonce += 1;
        }
        state.reserved.insert(nonce);

        debug!(chain_id, %account, nonce, on_chain, "Reserved nonce");

        NonceReservation {
            accounts: self.accounts.clone(),
            key: (chain_id, account),
            nonce,
            committed: false,
        }
    }

    /// Next nonce that would be reserved, ignoring in-flight reservations
    pub fn floor(&self, chain_id: u64, account: Address) -> u64 {
        self.accounts
            .get(&(chain_id, account))
            .map(|s| s.floor)
            .unwrap_or(0)
    }

    /// Number of nonces currently reserved for an account
    pub fn reserved_count(&self, chain_id: u64, account: Address) -> usize {
        self.accounts
            .get(&(chain_id, account))
            .map(|s| s.reserved.len())
            .unwrap_or(0)
    }
}

/// A nonce held by one attempt; released on drop unless committed
#[derive(Debug)]
pub struct NonceReservation {
    accounts: Arc<DashMap<AccountKey, AccountNonceState>>,
    key: AccountKey,
    nonce: u64,
    committed: bool,
}

impl NonceReservation {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Mark the nonce as used by a payload handed to the relay
    pub fn commit(mut self) -> CommittedNonce {
        if let Some(mut state) = self.accounts.get_mut(&self.key) {
            state.reserved.remove(&self.nonce);
            state.floor = state.floor.max(self.nonce + 1);
        }
        self.committed = true;

        CommittedNonce {
            accounts: self.accounts.clone(),
            key: self.key,
            nonce: self.nonce,
        }
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match self.accounts.get_mut(&self.key) {
            Some(mut state) => {
                state.reserved.remove(&self.nonce);
                debug!(chain_id = self.key.0, nonce = self.nonce, "Released nonce");
            }
            None => warn!(chain_id = self.key.0, nonce = self.nonce, "Released nonce for unknown account"),
        }
    }
}

/// A nonce consumed by a payload the relay may hold
#[derive(Debug)]
pub struct CommittedNonce {
    accounts: Arc<DashMap<AccountKey, AccountNonceState>>,
    key: AccountKey,
    nonce: u64,
}

impl CommittedNonce {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The relay definitely refused the payload; free the nonce again
    pub fn revoke(self) {
        if let Some(mut state) = self.accounts.get_mut(&self.key) {
            // If this was the latest nonce, we can reset
            if state.floor == self.nonce + 1 {
                state.floor = self.nonce;
                debug!(chain_id = self.key.0, nonce = self.nonce, "Revoked nonce");
            }
        }
    }
}
