//! Running performance metrics for the scheduling pool

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Caller-facing metrics snapshot; recomputed on a fixed cadence, so two
/// reads with no intervening round return identical values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_processed: u64,
    pub success_rate: f64,
    pub avg_execution_ms: f64,
    pub avg_gas_used: f64,
    /// Completions per second over the trailing window
    pub throughput_tps: f64,
    /// Achieved throughput relative to the configured target, percent
    pub gas_efficiency: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            total_processed: 0,
            success_rate: 0.0,
            avg_execution_ms: 0.0,
            avg_gas_used: 0.0,
            throughput_tps: 0.0,
            gas_efficiency: 0.0,
        }
    }
}

/// Counts of active and archived transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub queued: usize,
    pub processing: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
    pub active_slots: usize,
}

struct Totals {
    processed: u64,
    successes: u64,
    sum_execution_ms: f64,
    sum_gas_used: u128,
    /// Completion instants inside the trailing throughput window
    completions: VecDeque<Instant>,
}

/// Monotonic counters plus the published snapshot
pub(crate) struct PoolStats {
    window: Duration,
    target_tps: f64,
    totals: Mutex<Totals>,
    snapshot: RwLock<PerformanceMetrics>,
}

impl PoolStats {
    pub fn new(window: Duration, target_tps: f64) -> Self {
        Self {
            window,
            target_tps,
            totals: Mutex::new(Totals {
                processed: 0,
                successes: 0,
                sum_execution_ms: 0.0,
                sum_gas_used: 0,
                completions: VecDeque::new(),
            }),
            snapshot: RwLock::new(PerformanceMetrics::default()),
        }
    }

    pub async fn on_completed(&self, execution: Duration, gas_used: u64, now: Instant) {
        let mut totals = self.totals.lock().await;
        totals.processed += 1;
        totals.successes += 1;
        totals.sum_execution_ms += execution.as_secs_f64() * 1000.0;
        totals.sum_gas_used += gas_used as u128;
        totals.completions.push_back(now);
    }

    pub async fn on_failed(&self) {
        self.totals.lock().await.processed += 1;
    }

    /// Rebuild the published snapshot; called on the metrics cadence
    pub async fn recompute(&self, now: Instant) {
        let mut totals = self.totals.lock().await;

        while let Some(oldest) = totals.completions.front() {
            if now.duration_since(*oldest) > self.window {
                totals.completions.pop_front();
            } else {
                break;
            }
        }

        let throughput_tps = totals.completions.len() as f64 / self.window.as_secs_f64();
        let snapshot = PerformanceMetrics {
            total_processed: totals.processed,
            success_rate: if totals.processed > 0 {
                totals.successes as f64 / totals.processed as f64
            } else {
                0.0
            },
            avg_execution_ms: if totals.successes > 0 {
                totals.sum_execution_ms / totals.successes as f64
            } else {
                0.0
            },
            avg_gas_used: if totals.successes > 0 {
                totals.sum_gas_used as f64 / totals.successes as f64
            } else {
                0.0
            },
            throughput_tps,
            gas_efficiency: (throughput_tps / self.target_tps).min(1.0) * 100.0,
        };
        drop(totals);

        *self.snapshot.write().await = snapshot;
    }

    pub async fn current(&self) -> PerformanceMetrics {
        self.snapshot.read().await.clone()
    }
}
