//! Error types for the scheduling core

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Pool at capacity ({active}/{capacity}) with nothing evictable")]
    Capacity { active: usize, capacity: usize },

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Slot-wide failure: {0}")]
    Systemic(String),

    #[error("Nonce error for account {account}: {message}")]
    Nonce { account: String, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Fee oracle error: {0}")]
    Oracle(String),

    #[error("Retries exhausted for transaction {id}")]
    ExhaustedRetries { id: Uuid },
}

impl SchedulerError {
    /// Check if the error drives the retry path rather than a terminal failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Submission(_)
                | SchedulerError::Systemic(_)
                | SchedulerError::Nonce { .. }
                | SchedulerError::Oracle(_)
        )
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
