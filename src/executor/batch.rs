//! Concurrent slot execution against the Submitter collaborator

use super::nonce::NonceManager;
use super::submitter::{CallData, SubmissionReceipt, Submitter};
use crate::config::ExecutorConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::fee::PricedStrategy;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// One member of an execution slot, as handed over by the pool
#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub id: Uuid,
    pub call: CallData,
    pub gas_limit: u64,
}

/// Outcome of a single submission, attributed by request identity
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub request_id: Uuid,
    pub nonce: u64,
    pub result: Result<SubmissionReceipt, String>,
}

/// Aggregate outcome of one slot execution
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub successes: usize,
    pub failures: usize,
    pub total_gas_used: u64,
    pub elapsed: Duration,
    /// Per-request results in input order
    pub results: Vec<RequestOutcome>,
}

/// Advisory gas estimate for a set of requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    /// Sum of per-request estimates
    pub total_gas: u64,
    /// Estimate if the requests were encoded as one synthetic batch call
    pub batched_gas: u64,
    /// Advisory saving; slot-sizing input, never billed
    pub advisory_savings: u64,
}

/// Executes slots of requests concurrently with serialized nonce
/// allocation per signing account
pub struct BatchExecutor {
    submitter: Arc<dyn Submitter>,
    nonces: NonceManager,
    config: ExecutorConfig,
}

impl BatchExecutor {
    pub fn new(submitter: Arc<dyn Submitter>, config: ExecutorConfig) -> Self {
        Self {
            submitter,
            nonces: NonceManager::new(),
            config,
        }
    }

    /// Sum per-request gas estimates, with the synthetic-batch advisory
    /// discount at the bulk threshold. A failed estimate degrades to the
    /// caller's own gas limit rather than failing the whole slot.
    pub async fn estimate(&self, requests: &[SlotRequest]) -> GasEstimate {
        let estimate_timeout = Duration::from_secs(self.config.estimate_timeout_secs);
        let mut total_gas = 0u64;

        for request in requests {
            let estimated = match timeout(
                estimate_timeout,
                self.submitter.estimate_gas(&request.call),
            )
            .await
            {
                Ok(Ok(gas)) => gas,
                Ok(Err(e)) => {
                    debug!(
                        "Gas estimate for {} failed ({}), using caller limit",
                        request.id, e
                    );
                    request.gas_limit
                }
                Err(_) => {
                    debug!("Gas estimate for {} timed out, using caller limit", request.id);
                    request.gas_limit
                }
            };
            total_gas += estimated;
        }

        let batched_gas = if requests.len() >= self.config.bulk_threshold {
            total_gas * (100 - self.config.bulk_discount_percent) / 100
        } else {
            total_gas
        };

        GasEstimate {
            total_gas,
            batched_gas,
            advisory_savings: total_gas - batched_gas,
        }
    }

    /// Submit every request concurrently under one priced strategy.
    ///
    /// Nonce assignment order matches the input order; completion order
    /// is not guaranteed, but each result is attributed by request id.
    /// A per-request error is recorded as a failure with zero gas used;
    /// failing to obtain nonces at all is systemic and fails the slot.
    pub async fn execute_parallel(
        &self,
        requests: &[SlotRequest],
        strategy: &PricedStrategy,
    ) -> SchedulerResult<BatchOutcome> {
        let started = Instant::now();

        if requests.is_empty() {
            return Ok(BatchOutcome {
                successes: 0,
                failures: 0,
                total_gas_used: 0,
                elapsed: started.elapsed(),
                results: Vec::new(),
            });
        }

        let account = self.config.account.as_str();
        let nonce_range = self
            .nonces
            .reserve(account, requests.len() as u64, self.submitter.as_ref())
            .await
            .map_err(|e| SchedulerError::Systemic(format!("nonce reservation failed: {}", e)))?;

        let submit_timeout = Duration::from_secs(self.config.submit_timeout_secs);

        let submissions = requests.iter().zip(nonce_range).map(|(request, nonce)| {
            let submitter = self.submitter.clone();
            let gas_price = strategy.gas_price;
            async move {
                let result = match timeout(
                    submit_timeout,
                    submitter.sign_and_send(&request.call, nonce, gas_price, request.gas_limit),
                )
                .await
                {
                    Ok(Ok(receipt)) => Ok(receipt),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "submission timed out after {}s",
                        submit_timeout.as_secs()
                    )),
                };
                RequestOutcome {
                    request_id: request.id,
                    nonce,
                    result,
                }
            }
        });

        let results = join_all(submissions).await;

        let mut successes = 0;
        let mut failures = 0;
        let mut total_gas_used = 0u64;

        for outcome in &results {
            match &outcome.result {
                Ok(receipt) => {
                    successes += 1;
                    total_gas_used += receipt.gas_used;
                    self.nonces.confirm(account, outcome.nonce).await;
                }
                Err(reason) => {
                    failures += 1;
                    debug!("Submission {} failed: {}", outcome.request_id, reason);
                }
            }
        }

        if failures > 0 {
            // Re-align the local counter with the chain before the next slot
            if let Err(e) = self.nonces.sync(account, self.submitter.as_ref()).await {
                warn!("Nonce sync after failures did not succeed: {}", e);
            }
        }

        Ok(BatchOutcome {
            successes,
            failures,
            total_gas_used,
            elapsed: started.elapsed(),
            results,
        })
    }
}
