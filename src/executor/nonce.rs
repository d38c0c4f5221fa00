//! Nonce management for reliable transaction submission
//!
//! One fetch of the on-chain count per account, then local increments.
//! Reservation is serialized per account so no two in-flight
//! submissions for the same account can share a nonce.

use super::submitter::Submitter;
use crate::error::{SchedulerError, SchedulerResult};

use dashmap::DashMap;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-account nonce state
struct AccountNonceState {
    /// Next nonce to hand out
    next: u64,
    /// Highest nonce known confirmed
    confirmed: u64,
}

/// Manages nonce sequences across signing accounts
pub struct NonceManager {
    accounts: DashMap<String, Arc<Mutex<AccountNonceState>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Reserve a contiguous, strictly increasing range of `count` nonces
    /// for `account`. The on-chain count is fetched once on first use;
    /// later reservations are purely local increments.
    pub async fn reserve(
        &self,
        account: &str,
        count: u64,
        submitter: &dyn Submitter,
    ) -> SchedulerResult<Range<u64>> {
        let state = self.state_for(account, submitter).await?;
        let mut state = state.lock().await;

        let start = state.next;
        state.next += count;

        debug!("Reserved nonces {}..{} for {}", start, state.next, account);
        Ok(start..start + count)
    }

    /// Record a nonce as confirmed (submission succeeded)
    pub async fn confirm(&self, account: &str, nonce: u64) {
        let state = match self.accounts.get(account) {
            Some(entry) => entry.value().clone(),
            None => return,
        };
        let mut state = state.lock().await;
        if nonce > state.confirmed {
            state.confirmed = nonce;
        }
    }

    /// Re-align with the on-chain count after failures. Never moves the
    /// local counter backwards.
    pub async fn sync(&self, account: &str, submitter: &dyn Submitter) -> SchedulerResult<()> {
        let on_chain = submitter
            .nonce_count(account)
            .await
            .map_err(|e| SchedulerError::Nonce {
                account: account.to_string(),
                message: e.to_string(),
            })?;

        let state = self.state_for(account, submitter).await?;
        let mut state = state.lock().await;

        if on_chain > state.confirmed + 1 {
            warn!(
                "Nonce gap for {}: expected {}, on-chain {}",
                account,
                state.confirmed + 1,
                on_chain
            );
        }

        if state.next < on_chain {
            state.next = on_chain;
        }
        if on_chain > 0 && on_chain - 1 > state.confirmed {
            state.confirmed = on_chain - 1;
        }

        Ok(())
    }

    async fn state_for(
        &self,
        account: &str,
        submitter: &dyn Submitter,
    ) -> SchedulerResult<Arc<Mutex<AccountNonceState>>> {
        if let Some(state) = self.accounts.get(account) {
            return Ok(state.clone());
        }

        let on_chain = submitter
            .nonce_count(account)
            .await
            .map_err(|e| SchedulerError::Nonce {
                account: account.to_string(),
                message: e.to_string(),
            })?;

        debug!("Initialized nonce for {}: {}", account, on_chain);

        Ok(self
            .accounts
            .entry(account.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(AccountNonceState {
                    next: on_chain,
                    confirmed: on_chain.saturating_sub(1),
                }))
            })
            .clone())
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CallData, SubmissionReceipt};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StubSubmitter {
        count: AtomicU64,
    }

    #[async_trait]
    impl Submitter for StubSubmitter {
        async fn estimate_gas(&self, _call: &CallData) -> SchedulerResult<u64> {
            Ok(21_000)
        }

        async fn nonce_count(&self, _account: &str) -> SchedulerResult<u64> {
            Ok(self.count.load(Ordering::SeqCst))
        }

        async fn sign_and_send(
            &self,
            _call: &CallData,
            _nonce: u64,
            _gas_price: u128,
            _gas_limit: u64,
        ) -> SchedulerResult<SubmissionReceipt> {
            unreachable!("not used in nonce tests")
        }
    }

    #[tokio::test]
    async fn reservations_are_contiguous_and_monotonic() {
        let submitter = StubSubmitter {
            count: AtomicU64::new(7),
        };
        let nonces = NonceManager::new();

        let first = nonces.reserve("acct", 3, &submitter).await.unwrap();
        assert_eq!(first, 7..10);

        // On-chain count is only consulted once
        submitter.count.store(0, Ordering::SeqCst);
        let second = nonces.reserve("acct", 2, &submitter).await.unwrap();
        assert_eq!(second, 10..12);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_overlap() {
        let submitter = Arc::new(StubSubmitter {
            count: AtomicU64::new(0),
        });
        let nonces = Arc::new(NonceManager::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let nonces = nonces.clone();
            let submitter = submitter.clone();
            handles.push(tokio::spawn(async move {
                nonces.reserve("acct", 5, submitter.as_ref()).await.unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            let range = handle.await.unwrap();
            for nonce in range {
                assert!(seen.insert(nonce), "nonce {} reused", nonce);
            }
        }
        assert_eq!(seen.len(), 40);
    }

    #[tokio::test]
    async fn sync_never_moves_backwards() {
        let submitter = StubSubmitter {
            count: AtomicU64::new(10),
        };
        let nonces = NonceManager::new();

        let range = nonces.reserve("acct", 5, &submitter).await.unwrap();
        assert_eq!(range, 10..15);

        // On-chain behind local: local counter stays put
        submitter.count.store(3, Ordering::SeqCst);
        nonces.sync("acct", &submitter).await.unwrap();
        let range = nonces.reserve("acct", 1, &submitter).await.unwrap();
        assert_eq!(range, 15..16);

        // On-chain ahead: local counter catches up
        submitter.count.store(40, Ordering::SeqCst);
        nonces.sync("acct", &submitter).await.unwrap();
        let range = nonces.reserve("acct", 1, &submitter).await.unwrap();
        assert_eq!(range, 40..41);
    }
}
