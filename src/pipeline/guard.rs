//! One submission at a time per account

use crate::error::{PipelineError, PipelineResult};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tracing::debug;

/// Rejects a second attempt for an account while the first is running
#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard {
    active: Arc<DashMap<Address, ()>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `account` for the current attempt.
    ///
    /// Fails fast instead of queueing: a duplicate click must not produce a
    /// second transaction.
    pub fn try_acquire(&self, account: Address) -> PipelineResult<InFlightPermit> {
        match self.active.entry(account) {
            Entry::Occupied(_) => Err(PipelineError::SubmissionInFlight {
                account: format!("{:?}", account),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                debug!(%account, "Acquired submission permit");
                Ok(InFlightPermit {
                    active: self.active.clone(),
                    account,
                })
            }
        }
    }

    pub fn is_active(&self, account: Address) -> bool {
        self.active.contains_key(&account)
    }
}

/// Held for the duration of one attempt
#[derive(Debug)]
pub struct InFlightPermit {
    active: Arc<DashMap<Address, ()>>,
    account: Address,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.active.remove(&self.account);
    }
}
