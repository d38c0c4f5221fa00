//! Chain Scheduler - transaction scheduling core for high-throughput
//! blockchain submission
//!
//! Three cooperating components sit between callers and the chain:
//! the fee strategist prices submissions from recent gas history, the
//! batch executor turns slots of requests into concurrent signed
//! submissions with serialized nonce allocation, and the scheduling
//! pool owns admission, fairness, batching and retries.
//!
//! The chain itself is reached through two injected collaborators,
//! [`executor::Submitter`] and [`fee::FeeOracle`]; everything else is
//! self-contained.

pub mod config;
pub mod error;
pub mod executor;
pub mod fee;
pub mod metrics;
pub mod pool;

pub use config::Settings;
pub use error::{SchedulerError, SchedulerResult};
pub use executor::{BatchExecutor, CallData, SubmissionReceipt, Submitter};
pub use fee::{FeeOracle, FeeSample, FeeStrategist, Urgency};
pub use pool::{
    BatchOperation, CancelOutcome, OperationKind, OperationRequest, Priority, SchedulingPool,
    TxStatus,
};
