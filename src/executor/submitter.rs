//! Submitter collaborator: the boundary to the actual chain endpoint

use crate::error::SchedulerResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque call payload; encoding a specific operation kind is the
/// caller's responsibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    pub to: String,
    pub data: Vec<u8>,
    pub value: u128,
}

impl CallData {
    pub fn new(to: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            to: to.into(),
            data,
            value: 0,
        }
    }
}

/// Receipt for a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub tx_hash: String,
    pub gas_used: u64,
}

/// Signs and broadcasts raw transactions
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Estimate gas for a single call
    async fn estimate_gas(&self, call: &CallData) -> SchedulerResult<u64>;

    /// Current transaction count for the signing account
    async fn nonce_count(&self, account: &str) -> SchedulerResult<u64>;

    /// Sign and broadcast a call with an explicit nonce and price
    async fn sign_and_send(
        &self,
        call: &CallData,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
    ) -> SchedulerResult<SubmissionReceipt>;
}
