//! Batch executor module
//!
//! Turns a slot of requests plus a priced strategy into concurrent
//! submissions with per-account nonce serialization and per-request
//! failure attribution.

mod batch;
mod nonce;
mod submitter;

pub use batch::{BatchExecutor, BatchOutcome, GasEstimate, RequestOutcome, SlotRequest};
pub use nonce::NonceManager;
pub use submitter::{CallData, SubmissionReceipt, Submitter};
