//! The scheduling pool: admission control, fairness, batching, retry
//! orchestration and metrics
//!
//! Owns the pooled-transaction lifecycle:
//! `queued -> processing -> completed | retrying | failed`, with
//! `retrying` re-queued once its backoff elapses. Terminal transactions
//! move to a bounded archive.

use super::slot::{pack_slots, SlotCandidate, SlotLimits, SlotPlan};
use super::stats::{PerformanceMetrics, PoolStatus, PoolStats};
use super::transaction::{
    BatchOperation, CancelOutcome, OperationKind, OperationRequest, PooledTransaction, Priority,
    TxStatus,
};
use crate::config::PoolConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::{BatchExecutor, SlotRequest, SubmissionReceipt};
use crate::fee::{FeeSnapshot, FeeStrategist, Urgency};
use crate::metrics;

use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl From<Priority> for Urgency {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => Urgency::Low,
            Priority::Normal => Urgency::Normal,
            Priority::High => Urgency::High,
            Priority::Urgent => Urgency::Urgent,
        }
    }
}

/// Admission-control and orchestration layer over the batch executor
/// and fee strategist
pub struct SchedulingPool {
    config: PoolConfig,
    strategist: Arc<FeeStrategist>,
    executor: Arc<BatchExecutor>,
    /// Active pool: queued, retrying and processing transactions
    active: RwLock<HashMap<Uuid, PooledTransaction>>,
    /// Terminal transactions, purged by age
    archive: DashMap<Uuid, PooledTransaction>,
    stats: PoolStats,
    round_in_progress: AtomicBool,
    active_slots: AtomicUsize,
    shutdown: RwLock<bool>,
}

impl SchedulingPool {
    pub fn new(
        config: PoolConfig,
        strategist: Arc<FeeStrategist>,
        executor: Arc<BatchExecutor>,
    ) -> Self {
        let stats = PoolStats::new(config.throughput_window(), config.throughput_target_tps);
        Self {
            config,
            strategist,
            executor,
            active: RwLock::new(HashMap::new()),
            archive: DashMap::new(),
            stats,
            round_in_progress: AtomicBool::new(false),
            active_slots: AtomicUsize::new(0),
            shutdown: RwLock::new(false),
        }
    }

    /// Admit a request into the pool; returns its id without blocking
    /// on execution
    pub async fn submit(&self, request: OperationRequest) -> SchedulerResult<Uuid> {
        request.validate()?;
        if request.gas_limit > self.config.slot_gas_ceiling {
            return Err(SchedulerError::Validation(format!(
                "gas_limit {} exceeds slot gas ceiling {}",
                request.gas_limit, self.config.slot_gas_ceiling
            )));
        }

        let mut active = self.active.write().await;
        if active.len() >= self.config.max_pool_size {
            self.evict_lowest(&mut active, request.priority)?;
        }

        let tx = PooledTransaction::new(request);
        let id = tx.id;
        debug!(
            "Admitted {} for entity {} ({:?})",
            id, tx.request.entity_id, tx.request.priority
        );
        metrics::record_submitted(tx.request.priority);
        active.insert(id, tx);
        metrics::set_pool_size(active.len());

        Ok(id)
    }

    /// Submit one entity's burst as individually schedulable requests
    /// with staggered `not_before` offsets
    pub async fn submit_batch(
        &self,
        entity_id: &str,
        operations: Vec<BatchOperation>,
    ) -> SchedulerResult<Vec<Uuid>> {
        let base = Instant::now();
        let stagger = self.config.batch_stagger();
        let count = operations.len();
        let mut ids = Vec::with_capacity(count);

        for (i, op) in operations.into_iter().enumerate() {
            let request = OperationRequest {
                entity_id: entity_id.to_string(),
                kind: op.kind,
                gas_limit: op.gas_limit.unwrap_or_else(|| self.default_gas_for(op.kind)),
                call: op.call,
                priority: op.priority.unwrap_or(Priority::Normal),
                max_retries: self.config.default_max_retries,
                not_before: Some(base + stagger * i as u32),
                depends_on: Vec::new(),
            };
            ids.push(self.submit(request).await?);
        }

        info!("Submitted batch of {} operations for {}", count, entity_id);
        Ok(ids)
    }

    /// Look up a transaction in the active pool, then the archive
    pub async fn status(&self, id: Uuid) -> Option<PooledTransaction> {
        if let Some(tx) = self.active.read().await.get(&id) {
            return Some(tx.clone());
        }
        self.archive.get(&id).map(|entry| entry.clone())
    }

    /// Cancel a queued transaction. Race-free against rounds: once a
    /// round has moved it to processing this is a no-op reported as
    /// too late, and the transaction runs to completion or failure.
    pub async fn cancel(&self, id: Uuid) -> CancelOutcome {
        let mut active = self.active.write().await;
        match active.get(&id).map(|tx| tx.status) {
            Some(TxStatus::Queued) | Some(TxStatus::Retrying) => {
                let mut tx = active.remove(&id).expect("checked above");
                tx.status = TxStatus::Failed;
                tx.last_error = Some("cancelled by caller".into());
                tx.completed_at = Some(Instant::now());
                // Archived before the lock drops so a concurrent
                // `status` never misses the transaction entirely
                self.archive.insert(id, tx);
                metrics::set_pool_size(active.len());
                drop(active);

                metrics::record_cancelled();
                info!("Cancelled {}", id);
                CancelOutcome::Cancelled
            }
            Some(_) => CancelOutcome::TooLate,
            None if self.archive.contains_key(&id) => CancelOutcome::TooLate,
            None => CancelOutcome::NotFound,
        }
    }

    /// Latest published metrics snapshot
    pub async fn metrics(&self) -> PerformanceMetrics {
        self.stats.current().await
    }

    /// Counts of active and archived transactions
    pub async fn pool_status(&self) -> PoolStatus {
        let active = self.active.read().await;
        let mut queued = 0;
        let mut processing = 0;
        let mut retrying = 0;
        for tx in active.values() {
            match tx.status {
                TxStatus::Queued => queued += 1,
                TxStatus::Processing => processing += 1,
                TxStatus::Retrying => retrying += 1,
                _ => {}
            }
        }
        drop(active);

        let mut completed = 0;
        let mut failed = 0;
        for entry in self.archive.iter() {
            match entry.status {
                TxStatus::Completed => completed += 1,
                TxStatus::Failed => failed += 1,
                _ => {}
            }
        }

        PoolStatus {
            queued,
            processing,
            retrying,
            completed,
            failed,
            active_slots: self.active_slots.load(Ordering::Acquire),
        }
    }

    /// Combined fee view from the strategist
    pub async fn fee_snapshot(&self) -> FeeSnapshot {
        self.strategist.snapshot().await
    }

    /// Purge archived entries older than the threshold; returns the
    /// number removed. Counted inside the sweep itself: the archive may
    /// gain entries concurrently while `retain` runs.
    pub async fn evict_stale(&self, older_than: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0usize;
        self.archive.retain(|_, tx| {
            let reference = tx.completed_at.unwrap_or(tx.created_at);
            let keep = now.duration_since(reference) <= older_than;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            info!("Purged {} stale archived transactions", removed);
        }
        removed
    }

    /// Spawn the periodic driver: scheduling rounds, metrics snapshots
    /// and archive cleanup
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move { pool.run().await })
    }

    /// Stop the driver after its current iteration
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Scheduling pool shutdown initiated");
    }

    async fn run(&self) {
        let mut round_tick = interval(self.config.tick_interval());
        round_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut metrics_tick = interval(self.config.metrics_interval());
        metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cleanup_tick = interval(self.config.cleanup_interval());
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Scheduling pool started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                _ = round_tick.tick() => {
                    // A round still in flight suppresses a new one
                    if self
                        .round_in_progress
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        if let Err(e) = self.process_round().await {
                            error!("Scheduling round failed: {}", e);
                        }
                        self.round_in_progress.store(false, Ordering::Release);
                    } else {
                        debug!("Previous round still running, skipping tick");
                    }
                }

                _ = metrics_tick.tick() => {
                    self.stats.recompute(Instant::now()).await;
                }

                _ = cleanup_tick.tick() => {
                    self.evict_stale(self.config.archive_max_age()).await;
                }
            }
        }

        info!("Scheduling pool stopped");
    }

    /// One scheduling round: wake elapsed retries, cascade dependency
    /// failures, select and pack eligible transactions, dispatch slots
    /// concurrently and interpret the results
    pub(crate) async fn process_round(&self) -> SchedulerResult<()> {
        let now = Instant::now();

        let batches = {
            let mut active = self.active.write().await;

            // Retrying transactions whose backoff elapsed re-enter the queue
            for tx in active.values_mut() {
                if tx.status == TxStatus::Retrying && tx.time_eligible(now) {
                    tx.status = TxStatus::Queued;
                }
            }

            // A terminally failed dependency fails its dependents;
            // leaving them queued forever would leak pool capacity
            let cascade: Vec<Uuid> = active
                .values()
                .filter(|tx| {
                    tx.status == TxStatus::Queued
                        && tx.request.depends_on.iter().any(|dep| {
                            self.archive
                                .get(dep)
                                .map(|d| d.status == TxStatus::Failed)
                                .unwrap_or(false)
                        })
                })
                .map(|tx| tx.id)
                .collect();
            for id in cascade {
                if let Some(mut tx) = active.remove(&id) {
                    tx.status = TxStatus::Failed;
                    tx.last_error = Some("dependency failed".into());
                    tx.completed_at = Some(now);
                    warn!("Failing {} because a dependency failed", id);
                    self.archive.insert(id, tx);
                    self.stats.on_failed().await;
                    metrics::record_failed();
                }
            }

            let mut candidates: Vec<(SlotCandidate, Instant)> = active
                .values()
                .filter(|tx| {
                    tx.status == TxStatus::Queued
                        && tx.time_eligible(now)
                        && self.dependencies_met(tx)
                })
                .map(|tx| {
                    (
                        SlotCandidate {
                            id: tx.id,
                            entity_id: tx.request.entity_id.clone(),
                            priority: tx.request.priority,
                            gas_limit: tx.request.gas_limit,
                        },
                        tx.created_at,
                    )
                })
                .collect();

            // Priority descending, then oldest first
            candidates.sort_by(|(a, a_created), (b, b_created)| {
                b.priority.cmp(&a.priority).then(a_created.cmp(b_created))
            });
            let candidates: Vec<SlotCandidate> =
                candidates.into_iter().map(|(c, _)| c).collect();

            let limits = SlotLimits {
                slot_size: self.config.slot_size,
                gas_ceiling: self.config.slot_gas_ceiling,
                per_entity_cap: self.config.per_entity_slot_cap,
                max_slots: self.config.max_concurrent_slots,
            };
            let plans = pack_slots(&candidates, &limits);

            let mut batches: Vec<(SlotPlan, Vec<SlotRequest>)> = Vec::with_capacity(plans.len());
            for plan in plans {
                let mut requests = Vec::with_capacity(plan.members.len());
                for member in &plan.members {
                    let tx = active.get_mut(member).expect("packed from active set");
                    tx.status = TxStatus::Processing;
                    requests.push(SlotRequest {
                        id: *member,
                        call: tx.request.call.clone(),
                        gas_limit: tx.request.gas_limit,
                    });
                }
                batches.push((plan, requests));
            }
            batches
        };

        if batches.is_empty() {
            return Ok(());
        }

        debug!("Dispatching {} slots", batches.len());
        join_all(
            batches
                .into_iter()
                .map(|(plan, requests)| self.execute_slot(plan, requests)),
        )
        .await;

        metrics::set_pool_size(self.active.read().await.len());
        Ok(())
    }

    async fn execute_slot(&self, plan: SlotPlan, requests: Vec<SlotRequest>) {
        let started = Instant::now();
        self.active_slots.fetch_add(1, Ordering::AcqRel);
        metrics::record_slot_dispatched();

        let estimate = self.executor.estimate(&requests).await;
        if estimate.advisory_savings > 0 {
            debug!(
                "Synthetic batch estimated {} gas cheaper for {} requests",
                estimate.advisory_savings,
                requests.len()
            );
        }

        let strategy = self
            .strategist
            .quote(plan.priority.into(), estimate.total_gas)
            .await;

        match self.executor.execute_parallel(&requests, &strategy).await {
            Ok(outcome) => {
                for result in outcome.results {
                    match result.result {
                        Ok(receipt) => self.complete(result.request_id, receipt, started).await,
                        Err(reason) => self.fail_or_retry(result.request_id, reason).await,
                    }
                }
                info!(
                    "Slot resolved: {}/{} successful, {} gas used",
                    outcome.successes,
                    outcome.successes + outcome.failures,
                    outcome.total_gas_used
                );
            }
            Err(e) => {
                // Slot-wide failure: every member takes the retry path
                warn!("Slot failed systemically: {}", e);
                let reason = e.to_string();
                for request in &requests {
                    self.fail_or_retry(request.id, reason.clone()).await;
                }
            }
        }

        metrics::record_slot_latency(started.elapsed().as_secs_f64());
        self.active_slots.fetch_sub(1, Ordering::AcqRel);
    }

    async fn complete(&self, id: Uuid, receipt: SubmissionReceipt, slot_started: Instant) {
        let now = Instant::now();
        let mut active = self.active.write().await;
        let Some(mut tx) = active.remove(&id) else {
            return;
        };

        let gas_used = receipt.gas_used;
        tx.status = TxStatus::Completed;
        tx.tx_hash = Some(receipt.tx_hash);
        tx.gas_used = Some(gas_used);
        tx.completed_at = Some(now);
        self.archive.insert(id, tx);
        drop(active);

        self.stats
            .on_completed(now.duration_since(slot_started), gas_used, now)
            .await;
        metrics::record_completed();
    }

    async fn fail_or_retry(&self, id: Uuid, reason: String) {
        let now = Instant::now();
        let mut active = self.active.write().await;
        let exhausted = match active.get(&id) {
            Some(tx) => tx.attempt >= tx.request.max_retries,
            None => return,
        };

        if exhausted {
            let mut tx = active.remove(&id).expect("checked above");
            warn!(
                "{} failed terminally after {} attempts: {}",
                id,
                tx.attempt + 1,
                reason
            );
            tx.status = TxStatus::Failed;
            tx.last_error = Some(reason);
            tx.completed_at = Some(now);
            self.archive.insert(id, tx);
            drop(active);
            self.stats.on_failed().await;
            metrics::record_failed();
        } else {
            let tx = active.get_mut(&id).expect("checked above");
            tx.attempt += 1;
            tx.status = TxStatus::Retrying;
            tx.scheduled_for = Some(now + self.config.backoff_unit() * tx.attempt);
            tx.last_error = Some(reason);
            debug!("Retrying {} (attempt {})", id, tx.attempt);
            metrics::record_retry();
        }
    }

    fn dependencies_met(&self, tx: &PooledTransaction) -> bool {
        tx.request.depends_on.iter().all(|dep| {
            self.archive
                .get(dep)
                .map(|d| d.status == TxStatus::Completed)
                .unwrap_or(false)
        })
    }

    /// Evict the lowest-priority, oldest queued transaction strictly
    /// below the incoming priority; error if nothing qualifies
    fn evict_lowest(
        &self,
        active: &mut HashMap<Uuid, PooledTransaction>,
        incoming: Priority,
    ) -> SchedulerResult<()> {
        let victim = active
            .values()
            .filter(|tx| tx.status == TxStatus::Queued && tx.request.priority < incoming)
            .min_by(|a, b| {
                a.request
                    .priority
                    .cmp(&b.request.priority)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .map(|tx| tx.id);

        let Some(id) = victim else {
            return Err(SchedulerError::Capacity {
                active: active.len(),
                capacity: self.config.max_pool_size,
            });
        };

        let mut tx = active.remove(&id).expect("selected from active set");
        tx.status = TxStatus::Failed;
        tx.last_error = Some("evicted under capacity pressure".into());
        tx.completed_at = Some(Instant::now());
        warn!("Evicted {} under capacity pressure", id);
        self.archive.insert(id, tx);
        metrics::record_evicted();

        Ok(())
    }

    fn default_gas_for(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::Create => self.config.default_gas.create,
            OperationKind::Update => self.config.default_gas.update,
            OperationKind::Record => self.config.default_gas.record,
            OperationKind::Transfer => self.config.default_gas.transfer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutorConfig, FeeConfig};
    use crate::error::SchedulerResult;
    use crate::executor::{CallData, Submitter};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;

    /// Succeeds every call with a fixed receipt; calls to "fail:*" error
    struct TestSubmitter {
        nonce: AtomicU64,
    }

    #[async_trait]
    impl Submitter for TestSubmitter {
        async fn estimate_gas(&self, _call: &CallData) -> SchedulerResult<u64> {
            Ok(80_000)
        }

        async fn nonce_count(&self, _account: &str) -> SchedulerResult<u64> {
            Ok(self.nonce.load(Ordering::SeqCst))
        }

        async fn sign_and_send(
            &self,
            call: &CallData,
            nonce: u64,
            _gas_price: u128,
            _gas_limit: u64,
        ) -> SchedulerResult<SubmissionReceipt> {
            if call.to.starts_with("fail") {
                return Err(SchedulerError::Submission("execution reverted".into()));
            }
            Ok(SubmissionReceipt {
                tx_hash: format!("0x{:064x}", nonce),
                gas_used: 55_000,
            })
        }
    }

    fn pool_with(config: PoolConfig) -> Arc<SchedulingPool> {
        let strategist = Arc::new(FeeStrategist::new(FeeConfig::default()));
        let executor = Arc::new(BatchExecutor::new(
            Arc::new(TestSubmitter {
                nonce: AtomicU64::new(0),
            }),
            ExecutorConfig::default(),
        ));
        Arc::new(SchedulingPool::new(config, strategist, executor))
    }

    fn request(entity: &str, priority: Priority) -> OperationRequest {
        OperationRequest {
            entity_id: entity.into(),
            kind: OperationKind::Record,
            call: CallData::new("0xc0ffee", vec![1]),
            priority,
            gas_limit: 100_000,
            max_retries: 3,
            not_before: None,
            depends_on: Vec::new(),
        }
    }

    #[tokio::test]
    async fn submit_rejects_invalid_requests() {
        let pool = pool_with(PoolConfig::default());
        let mut r = request("e", Priority::Normal);
        r.gas_limit = 0;
        assert!(matches!(
            pool.submit(r).await,
            Err(SchedulerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn submit_rejects_gas_over_slot_ceiling() {
        let pool = pool_with(PoolConfig::default());
        let mut r = request("e", Priority::Normal);
        r.gas_limit = 10_000_001;
        assert!(matches!(
            pool.submit(r).await,
            Err(SchedulerError::Validation(_))
        ));
    }

    /// Mixed priorities across entities: one round with a single slot
    /// must take every urgent transaction plus the oldest normals
    #[tokio::test(start_paused = true)]
    async fn first_round_prefers_urgent_then_oldest_normal() {
        let mut config = PoolConfig::default();
        config.max_concurrent_slots = 1;
        let pool = pool_with(config);

        let mut normals = Vec::new();
        for i in 0..20 {
            normals.push(
                pool.submit(request(&format!("n{}", i), Priority::Normal))
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let mut urgents = Vec::new();
        for i in 0..3 {
            urgents.push(
                pool.submit(request(&format!("u{}", i), Priority::Urgent))
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        pool.process_round().await.unwrap();

        // Urgents submitted last still preempt the older normals
        for id in &urgents {
            assert_eq!(pool.status(*id).await.unwrap().status, TxStatus::Completed);
        }
        for id in &normals[..17] {
            assert_eq!(pool.status(*id).await.unwrap().status, TxStatus::Completed);
        }
        // The three youngest normals wait for the next round
        for id in &normals[17..] {
            assert_eq!(pool.status(*id).await.unwrap().status, TxStatus::Queued);
        }
    }

    #[tokio::test]
    async fn capacity_pressure_evicts_lowest_priority_oldest() {
        let mut config = PoolConfig::default();
        config.max_pool_size = 2;
        let pool = pool_with(config);

        let first_low = pool.submit(request("a", Priority::Low)).await.unwrap();
        let _second_low = pool.submit(request("b", Priority::Low)).await.unwrap();

        // Pool full: a higher-priority submit evicts the oldest low
        let high = pool.submit(request("c", Priority::High)).await.unwrap();
        assert_eq!(pool.active.read().await.len(), 2);

        let evicted = pool.status(first_low).await.unwrap();
        assert_eq!(evicted.status, TxStatus::Failed);
        assert!(evicted.last_error.unwrap().contains("evicted"));
        assert!(pool.status(high).await.is_some());
    }

    #[tokio::test]
    async fn capacity_error_when_nothing_evictable() {
        let mut config = PoolConfig::default();
        config.max_pool_size = 1;
        let pool = pool_with(config);

        pool.submit(request("a", Priority::Urgent)).await.unwrap();
        let err = pool.submit(request("b", Priority::Low)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Capacity { .. }));
    }

    #[tokio::test]
    async fn round_completes_queued_transactions() {
        let pool = pool_with(PoolConfig::default());
        let id = pool.submit(request("e", Priority::Normal)).await.unwrap();

        pool.process_round().await.unwrap();

        let tx = pool.status(id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Completed);
        assert!(tx.tx_hash.is_some());
        assert_eq!(tx.gas_used, Some(55_000));
        assert!(pool.active.read().await.is_empty());
    }

    #[tokio::test]
    async fn failure_schedules_linear_backoff() {
        let pool = pool_with(PoolConfig::default());
        let mut r = request("e", Priority::Normal);
        r.call.to = "fail:revert".into();
        let id = pool.submit(r).await.unwrap();

        pool.process_round().await.unwrap();
        let tx = pool.status(id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Retrying);
        assert_eq!(tx.attempt, 1);
        assert!(tx.scheduled_for.is_some());

        // Backoff not yet elapsed: the next round must skip it
        pool.process_round().await.unwrap();
        let tx = pool.status(id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Retrying);
        assert_eq!(tx.attempt, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_terminally_with_attempt_at_bound() {
        let pool = pool_with(PoolConfig::default());
        let mut r = request("e", Priority::Normal);
        r.call.to = "fail:revert".into();
        r.max_retries = 2;
        let id = pool.submit(r).await.unwrap();

        for _ in 0..4 {
            pool.process_round().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        }

        let tx = pool.status(id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(tx.attempt, 2);
    }

    #[tokio::test]
    async fn cancel_removes_queued_reports_late_and_missing() {
        let pool = pool_with(PoolConfig::default());
        let id = pool.submit(request("e", Priority::Normal)).await.unwrap();

        assert_eq!(pool.cancel(id).await, CancelOutcome::Cancelled);
        let tx = pool.status(id).await.unwrap();
        assert_eq!(tx.status, TxStatus::Failed);
        assert!(tx.last_error.unwrap().contains("cancelled"));

        // Terminal (archived) ids are too late; unknown ids are not found
        assert_eq!(pool.cancel(id).await, CancelOutcome::TooLate);
        assert_eq!(pool.cancel(Uuid::new_v4()).await, CancelOutcome::NotFound);

        // Cancelled transactions are never executed
        pool.process_round().await.unwrap();
        assert_eq!(pool.status(id).await.unwrap().status, TxStatus::Failed);
    }

    #[tokio::test]
    async fn dependent_waits_for_dependency_completion() {
        let pool = pool_with(PoolConfig::default());
        let dep = pool.submit(request("a", Priority::Normal)).await.unwrap();

        let mut r = request("b", Priority::Normal);
        r.depends_on = vec![dep];
        let dependent = pool.submit(r).await.unwrap();

        // Dependency and dependent both queued: only the dependency runs
        pool.process_round().await.unwrap();
        assert_eq!(
            pool.status(dep).await.unwrap().status,
            TxStatus::Completed
        );

        // Now the dependency is archived completed, the dependent runs
        pool.process_round().await.unwrap();
        assert_eq!(
            pool.status(dependent).await.unwrap().status,
            TxStatus::Completed
        );
    }

    #[tokio::test]
    async fn dependent_never_runs_before_dependency() {
        let pool = pool_with(PoolConfig::default());

        let mut dep_request = request("a", Priority::Normal);
        dep_request.not_before = Some(Instant::now() + Duration::from_secs(3600));
        let dep = pool.submit(dep_request).await.unwrap();

        let mut r = request("b", Priority::Urgent);
        r.depends_on = vec![dep];
        let dependent = pool.submit(r).await.unwrap();

        for _ in 0..5 {
            pool.process_round().await.unwrap();
        }
        assert_eq!(pool.status(dependent).await.unwrap().status, TxStatus::Queued);
    }

    #[tokio::test]
    async fn failed_dependency_cascades() {
        let pool = pool_with(PoolConfig::default());

        let mut dep_request = request("a", Priority::Normal);
        dep_request.call.to = "fail:revert".into();
        dep_request.max_retries = 0;
        let dep = pool.submit(dep_request).await.unwrap();

        let mut r = request("b", Priority::Normal);
        r.depends_on = vec![dep];
        let dependent = pool.submit(r).await.unwrap();

        pool.process_round().await.unwrap();
        assert_eq!(pool.status(dep).await.unwrap().status, TxStatus::Failed);

        pool.process_round().await.unwrap();
        let tx = pool.status(dependent).await.unwrap();
        assert_eq!(tx.status, TxStatus::Failed);
        assert!(tx.last_error.unwrap().contains("dependency"));
    }

    #[tokio::test]
    async fn submit_batch_staggers_not_before() {
        let pool = pool_with(PoolConfig::default());
        let ops: Vec<BatchOperation> = (0..3)
            .map(|_| BatchOperation {
                kind: OperationKind::Update,
                call: CallData::new("0xc0ffee", vec![1]),
                priority: None,
                gas_limit: None,
            })
            .collect();

        let ids = pool.submit_batch("entity", ops).await.unwrap();
        assert_eq!(ids.len(), 3);

        let active = pool.active.read().await;
        let mut offsets: Vec<Instant> = ids
            .iter()
            .map(|id| active[id].scheduled_for.unwrap())
            .collect();
        offsets.sort();
        assert!(offsets[1] - offsets[0] >= Duration::from_millis(100));
        assert!(offsets[2] - offsets[1] >= Duration::from_millis(100));

        // Default gas per kind applied
        assert_eq!(active[&ids[0]].request.gas_limit, 120_000);
    }

    #[tokio::test]
    async fn pool_status_counts_match_contents() {
        let pool = pool_with(PoolConfig::default());
        pool.submit(request("a", Priority::Normal)).await.unwrap();
        let done = pool.submit(request("b", Priority::Normal)).await.unwrap();
        pool.process_round().await.unwrap();

        let mut deferred = request("c", Priority::Normal);
        deferred.not_before = Some(Instant::now() + Duration::from_secs(3600));
        pool.submit(deferred).await.unwrap();

        let status = pool.pool_status().await;
        assert_eq!(status.queued, 1);
        assert_eq!(status.processing, 0);
        assert_eq!(status.completed, 2);
        assert_eq!(status.failed, 0);
        assert_eq!(status.active_slots, 0);
        assert_eq!(
            pool.status(done).await.unwrap().status,
            TxStatus::Completed
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn evict_stale_tolerates_concurrent_archive_inserts() {
        let pool = pool_with(PoolConfig::default());

        let writer_pool = pool.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..2_000 {
                let mut tx = PooledTransaction::new(request("e", Priority::Normal));
                tx.status = TxStatus::Completed;
                tx.completed_at = Some(Instant::now());
                writer_pool.archive.insert(tx.id, tx);
            }
        });

        // Sweeps racing the writer must neither panic nor remove fresh
        // entries
        for _ in 0..50 {
            assert_eq!(pool.evict_stale(Duration::from_secs(3600)).await, 0);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        assert_eq!(pool.archive.len(), 2_000);
        assert_eq!(pool.evict_stale(Duration::from_secs(0)).await, 2_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_never_gaps_while_transactions_settle() {
        let pool = pool_with(PoolConfig::default());
        let mut ids = Vec::new();
        for i in 0..40 {
            ids.push(
                pool.submit(request(&format!("e{}", i), Priority::Normal))
                    .await
                    .unwrap(),
            );
        }

        let reader_pool = pool.clone();
        let reader_ids = ids.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = stop.clone();
        let reader = tokio::spawn(async move {
            while !reader_stop.load(Ordering::Acquire) {
                for id in &reader_ids {
                    assert!(
                        reader_pool.status(*id).await.is_some(),
                        "transaction {} vanished mid-settlement",
                        id
                    );
                }
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..5 {
            pool.process_round().await.unwrap();
        }
        stop.store(true, Ordering::Release);
        reader.await.unwrap();

        for id in &ids {
            assert_eq!(pool.status(*id).await.unwrap().status, TxStatus::Completed);
        }
    }

    #[tokio::test]
    async fn evict_stale_purges_old_archive_entries() {
        let pool = pool_with(PoolConfig::default());
        let id = pool.submit(request("a", Priority::Normal)).await.unwrap();
        pool.process_round().await.unwrap();
        assert!(pool.status(id).await.is_some());

        assert_eq!(pool.evict_stale(Duration::from_secs(3600)).await, 0);
        assert_eq!(pool.evict_stale(Duration::from_secs(0)).await, 1);
        assert!(pool.status(id).await.is_none());
    }
}
