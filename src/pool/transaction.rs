//! Pooled transaction lifecycle types

use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::CallData;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Admission priority; higher is selected into slots no later than lower
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// Kind of write operation; the payload encoding stays opaque to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Record,
    Transfer,
}

/// Caller-supplied unit of work
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Logical owner; fairness and ordering unit
    pub entity_id: String,
    pub kind: OperationKind,
    pub call: CallData,
    pub priority: Priority,
    /// Caller-estimated upper bound, must be positive
    pub gas_limit: u64,
    pub max_retries: u32,
    /// Not eligible for selection before this instant
    pub not_before: Option<Instant>,
    /// Requests that must reach terminal success first
    pub depends_on: Vec<Uuid>,
}

impl OperationRequest {
    pub(crate) fn validate(&self) -> SchedulerResult<()> {
        if self.entity_id.is_empty() {
            return Err(SchedulerError::Validation("entity_id must be set".into()));
        }
        if self.gas_limit == 0 {
            return Err(SchedulerError::Validation(
                "gas_limit must be positive".into(),
            ));
        }
        if self.call.to.is_empty() {
            return Err(SchedulerError::Validation(
                "call target must be set".into(),
            ));
        }
        Ok(())
    }
}

/// One element of a `submit_batch` call; omitted fields fall back to
/// configured defaults
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub kind: OperationKind,
    pub call: CallData,
    pub priority: Option<Priority>,
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Queued,
    Processing,
    Retrying,
    Completed,
    Failed,
}

/// Operation request plus scheduler-owned state. Owned exclusively by
/// the pool; callers only see clones via `status`.
#[derive(Debug, Clone)]
pub struct PooledTransaction {
    pub id: Uuid,
    pub request: OperationRequest,
    pub status: TxStatus,
    /// Failures so far; never exceeds `max_retries` outside `Failed`
    pub attempt: u32,
    pub created_at: Instant,
    /// Next eligible instant, used for backoff
    pub scheduled_for: Option<Instant>,
    pub tx_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub last_error: Option<String>,
    pub completed_at: Option<Instant>,
}

impl PooledTransaction {
    pub(crate) fn new(request: OperationRequest) -> Self {
        let scheduled_for = request.not_before;
        Self {
            id: Uuid::new_v4(),
            request,
            status: TxStatus::Queued,
            attempt: 0,
            created_at: Instant::now(),
            scheduled_for,
            tx_hash: None,
            gas_used: None,
            last_error: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TxStatus::Completed | TxStatus::Failed)
    }

    /// Time-eligible for selection (dependency checks are separate)
    pub(crate) fn time_eligible(&self, now: Instant) -> bool {
        match self.scheduled_for {
            Some(at) => now >= at,
            None => true,
        }
    }
}

/// Outcome of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed before any execution started
    Cancelled,
    /// Already processing or terminal; the transaction runs its course
    TooLate,
    NotFound,
}
