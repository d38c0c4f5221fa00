//! Scheduling pool: admission, fairness, slot packing and lifecycle

mod scheduler;
mod slot;
mod stats;
mod transaction;

pub use scheduler::SchedulingPool;
pub use stats::{PerformanceMetrics, PoolStatus};
pub use transaction::{
    BatchOperation, CancelOutcome, OperationKind, OperationRequest, PooledTransaction, Priority,
    TxStatus,
};
