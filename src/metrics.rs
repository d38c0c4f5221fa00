//! Prometheus metrics for monitoring
//!
//! Exposes counters for admission, slot execution and retry behavior.
//! The caller-facing `PerformanceMetrics` snapshot lives in the pool;
//! these process-wide series are for scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

use crate::pool::Priority;

lazy_static! {
    // Admission metrics
    pub static ref TX_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "chain_scheduler_transactions_submitted_total",
        "Total transactions admitted to the pool by priority",
        &["priority"]
    ).unwrap();

    pub static ref TX_EVICTED: IntCounter = register_int_counter!(
        "chain_scheduler_transactions_evicted_total",
        "Total queued transactions evicted under capacity pressure"
    ).unwrap();

    pub static ref TX_CANCELLED: IntCounter = register_int_counter!(
        "chain_scheduler_transactions_cancelled_total",
        "Total transactions cancelled by callers before execution"
    ).unwrap();

    // Outcome metrics
    pub static ref TX_COMPLETED: IntCounter = register_int_counter!(
        "chain_scheduler_transactions_completed_total",
        "Total transactions completed successfully"
    ).unwrap();

    pub static ref TX_FAILED: IntCounter = register_int_counter!(
        "chain_scheduler_transactions_failed_total",
        "Total transactions terminally failed"
    ).unwrap();

    pub static ref TX_RETRIES: IntCounter = register_int_counter!(
        "chain_scheduler_transaction_retries_total",
        "Total retry attempts scheduled after recoverable failures"
    ).unwrap();

    // Slot metrics
    pub static ref SLOTS_DISPATCHED: IntCounter = register_int_counter!(
        "chain_scheduler_slots_dispatched_total",
        "Total execution slots dispatched"
    ).unwrap();

    pub static ref SLOT_LATENCY: Histogram = register_histogram!(
        "chain_scheduler_slot_latency_seconds",
        "Slot execution latency from dispatch to resolution",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Pool state
    pub static ref POOL_SIZE: IntGauge = register_int_gauge!(
        "chain_scheduler_pool_size",
        "Active (non-archived) transactions in the pool"
    ).unwrap();

    // Fee oracle
    pub static ref ORACLE_ERRORS: IntCounter = register_int_counter!(
        "chain_scheduler_fee_oracle_errors_total",
        "Total fee oracle poll failures"
    ).unwrap();
}

// Helper functions to record metrics

pub fn record_submitted(priority: Priority) {
    TX_SUBMITTED
        .with_label_values(&[priority.as_str()])
        .inc();
}

pub fn record_evicted() {
    TX_EVICTED.inc();
}

pub fn record_cancelled() {
    TX_CANCELLED.inc();
}

pub fn record_completed() {
    TX_COMPLETED.inc();
}

pub fn record_failed() {
    TX_FAILED.inc();
}

pub fn record_retry() {
    TX_RETRIES.inc();
}

pub fn record_slot_dispatched() {
    SLOTS_DISPATCHED.inc();
}

pub fn record_slot_latency(latency_secs: f64) {
    SLOT_LATENCY.observe(latency_secs);
}

pub fn set_pool_size(size: usize) {
    POOL_SIZE.set(size as i64);
}

pub fn record_oracle_error() {
    ORACLE_ERRORS.inc();
}
