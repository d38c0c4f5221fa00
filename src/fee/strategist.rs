//! Fee strategist: congestion classification, price prediction and quoting
//!
//! Never raises a hard error for normal inputs. Insufficient history
//! degrades confidence instead of failing; an infeasible budget is an
//! explicit empty result.

use super::history::{extrapolate, mean, variance, FeeHistory, FeeSample};
use super::FeeOracle;
use crate::config::FeeConfig;
use crate::metrics;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, warn};

/// Hard floor for any predicted or quoted price: 1 gwei
const PRICE_FLOOR_WEI: u128 = 1_000_000_000;

/// Rolling window of derived network conditions kept for trend inspection
const CONDITIONS_WINDOW: usize = 32;

/// Requested urgency for a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

/// Coarse classification of current network load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Pricing tier backing a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Economy,
    Standard,
    Fast,
    Instant,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Derived snapshot of network load, recomputed per strategy request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub congestion: CongestionLevel,
    pub pending_count: u64,
    pub avg_block_time_secs: f64,
}

/// Short-horizon price prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeePrediction {
    pub next_period: u128,
    pub next_five_periods: u128,
    pub trend: PriceTrend,
    pub confidence: f64,
}

/// Priced strategy for one quote; immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedStrategy {
    pub tier: FeeTier,
    pub gas_price: u128,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub expected_confirmation_secs: u64,
    pub estimated_cost: u128,
}

/// Read-only view over prices, prediction and conditions in one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSnapshot {
    pub current: FeeSample,
    pub prediction: FeePrediction,
    pub conditions: NetworkConditions,
}

/// Converts fee history into actionable prices for a requested urgency
pub struct FeeStrategist {
    config: FeeConfig,
    history: RwLock<FeeHistory>,
    conditions: RwLock<VecDeque<NetworkConditions>>,
    shutdown: RwLock<bool>,
}

impl FeeStrategist {
    pub fn new(config: FeeConfig) -> Self {
        let history = FeeHistory::new(config.history_limit);
        Self {
            config,
            history: RwLock::new(history),
            conditions: RwLock::new(VecDeque::with_capacity(CONDITIONS_WINDOW)),
            shutdown: RwLock::new(false),
        }
    }

    /// Append a fee sample to the bounded history
    pub async fn record_sample(&self, sample: FeeSample) {
        self.history.write().await.push(sample);
    }

    /// Current tier prices: latest sample, or the configured floor
    /// defaults when no history exists
    pub async fn current_prices(&self) -> FeeSample {
        if let Some(latest) = self.history.read().await.latest() {
            return latest.clone();
        }
        FeeSample {
            timestamp: Utc::now(),
            slow: gwei(self.config.default_slow_gwei),
            standard: gwei(self.config.default_standard_gwei),
            fast: gwei(self.config.default_fast_gwei),
            instant: gwei(self.config.default_instant_gwei),
        }
    }

    /// Classify network congestion from recent samples
    pub async fn classify_conditions(&self) -> NetworkConditions {
        let (current, recent) = {
            let history = self.history.read().await;
            let current = history
                .latest()
                .map(|s| s.standard)
                .unwrap_or_else(|| gwei(self.config.default_standard_gwei));
            (current, history.recent_standard(10))
        };

        let congestion = if recent.len() > 5 {
            let avg = recent.iter().sum::<u128>() / recent.len() as u128;
            let ratio_pct = if avg > 0 { current * 100 / avg } else { 100 };
            match ratio_pct {
                p if p > 150 => CongestionLevel::Critical,
                p if p > 130 => CongestionLevel::High,
                p if p > 110 => CongestionLevel::Medium,
                _ => CongestionLevel::Low,
            }
        } else {
            CongestionLevel::Low
        };

        // Heuristic estimates; no live mempool oracle is wired into this
        // core, so they are a deterministic function of the classification
        let base = self.config.base_block_time_secs;
        let (pending_count, avg_block_time_secs) = match congestion {
            CongestionLevel::Low => (1_200, base),
            CongestionLevel::Medium => (4_800, base * 1.2),
            CongestionLevel::High => (9_000, base * 1.5),
            CongestionLevel::Critical => (14_000, base * 2.0),
        };

        let conditions = NetworkConditions {
            congestion,
            pending_count,
            avg_block_time_secs,
        };

        let mut window = self.conditions.write().await;
        if window.len() == CONDITIONS_WINDOW {
            window.pop_front();
        }
        window.push_back(conditions.clone());

        conditions
    }

    /// Predict near-future standard price via a linear trend fit
    pub async fn predict(&self) -> FeePrediction {
        let history = self.history.read().await;
        let prices = history.recent_standard(self.config.min_trend_samples);

        if prices.len() < self.config.min_trend_samples {
            // Explicit low-data fallback
            let latest = history
                .latest()
                .map(|s| s.standard)
                .unwrap_or_else(|| gwei(self.config.default_standard_gwei));
            return FeePrediction {
                next_period: latest,
                next_five_periods: latest,
                trend: PriceTrend::Stable,
                confidence: 0.5,
            };
        }
        drop(history);

        let values: Vec<f64> = prices.iter().map(|&p| p as f64).collect();

        let recent = mean(&values[values.len() - 3..]);
        let older = mean(&values[values.len() - 6..values.len() - 3]);
        let change_pct = if older > 0.0 {
            (recent - older) / older * 100.0
        } else {
            0.0
        };
        let trend = if change_pct > 10.0 {
            PriceTrend::Increasing
        } else if change_pct < -10.0 {
            PriceTrend::Decreasing
        } else {
            PriceTrend::Stable
        };

        let m = mean(&values);
        let coefficient = if m > 0.0 { variance(&values).sqrt() / m } else { 1.0 };
        let confidence = (1.0 - coefficient).clamp(0.1, 0.95);

        FeePrediction {
            next_period: floor_price(extrapolate(&values, 1)),
            next_five_periods: floor_price(extrapolate(&values, 5)),
            trend,
            confidence,
        }
    }

    /// Quote a priced strategy for the requested urgency
    pub async fn quote(&self, urgency: Urgency, gas_limit: u64) -> PricedStrategy {
        let conditions = self.classify_conditions().await;
        let prices = self.current_prices().await;

        let strategy = match urgency {
            Urgency::Urgent => self.tier_quote(FeeTier::Fast, &prices, &conditions, gas_limit),
            Urgency::High => {
                let prediction = self.predict().await;
                self.dynamic_quote(&prediction, &conditions, gas_limit)
            }
            Urgency::Low => self.tier_quote(FeeTier::Economy, &prices, &conditions, gas_limit),
            Urgency::Normal => {
                let mut base =
                    self.tier_quote(FeeTier::Standard, &prices, &conditions, gas_limit);
                // Under pressure, nudge the standard price toward the
                // predicted one to avoid quoting into a rising market
                if matches!(
                    conditions.congestion,
                    CongestionLevel::Medium | CongestionLevel::High
                ) {
                    let predicted = self.predict().await.next_period;
                    base.gas_price = floor_price(((base.gas_price + predicted) / 2) as f64);
                    base.estimated_cost = base.gas_price * gas_limit as u128;
                }
                base
            }
        };

        debug!(
            tier = ?strategy.tier,
            gas_price = strategy.gas_price,
            urgency = ?urgency,
            "Quoted strategy"
        );
        strategy
    }

    /// Quote for a homogeneous batch, tier chosen by wait budget with a
    /// capped bulk discount
    pub async fn quote_for_batch(
        &self,
        count: usize,
        avg_gas_limit: u64,
        max_wait_secs: u64,
    ) -> PricedStrategy {
        let conditions = self.classify_conditions().await;
        let prices = self.current_prices().await;

        let tier = if max_wait_secs > 300 {
            FeeTier::Economy
        } else if max_wait_secs > 60 {
            FeeTier::Standard
        } else {
            FeeTier::Fast
        };

        let mut strategy = self.tier_quote(tier, &prices, &conditions, avg_gas_limit);

        let discount = (count as u64 * self.config.batch_discount_per_tx_percent)
            .min(self.config.batch_discount_cap_percent);
        strategy.gas_price = strategy.gas_price * (100 - discount as u128) / 100;
        strategy.estimated_cost = strategy.gas_price * avg_gas_limit as u128 * count as u128;

        debug!(count, discount, "Batch quote with bulk discount");
        strategy
    }

    /// First tier (economy, standard, fast) whose cost fits `max_budget`
    /// and whose expected confirmation fits `max_wait_secs`; `None` when
    /// nothing qualifies
    pub async fn quote_within_budget(
        &self,
        max_budget: u128,
        gas_limit: u64,
        max_wait_secs: u64,
    ) -> Option<PricedStrategy> {
        let conditions = self.classify_conditions().await;
        let prices = self.current_prices().await;

        for tier in [FeeTier::Economy, FeeTier::Standard, FeeTier::Fast] {
            let strategy = self.tier_quote(tier, &prices, &conditions, gas_limit);
            if strategy.estimated_cost <= max_budget
                && strategy.expected_confirmation_secs <= max_wait_secs
            {
                return Some(strategy);
            }
        }
        None
    }

    /// Combined read-only view for dashboards and callers
    pub async fn snapshot(&self) -> FeeSnapshot {
        FeeSnapshot {
            current: self.current_prices().await,
            prediction: self.predict().await,
            conditions: self.classify_conditions().await,
        }
    }

    /// Poll the oracle on the configured cadence, appending samples to
    /// history; a failed poll falls back to the last-known sample
    pub fn spawn_poller(self: &Arc<Self>, oracle: Arc<dyn FeeOracle>) -> JoinHandle<()> {
        let strategist = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(strategist.config.poll_interval_secs));
            let call_timeout = Duration::from_secs(strategist.config.oracle_timeout_secs);

            loop {
                tick.tick().await;
                if *strategist.shutdown.read().await {
                    break;
                }

                match timeout(call_timeout, oracle.current_price()).await {
                    Ok(Ok(sample)) => {
                        strategist.record_sample(sample).await;
                    }
                    Ok(Err(e)) => {
                        warn!("Fee oracle poll failed: {}", e);
                        metrics::record_oracle_error();
                        strategist.reappend_last_known().await;
                    }
                    Err(_) => {
                        warn!("Fee oracle poll timed out");
                        metrics::record_oracle_error();
                        strategist.reappend_last_known().await;
                    }
                }
            }
            debug!("Fee poller stopped");
        })
    }

    /// Stop the poller task
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }

    async fn reappend_last_known(&self) {
        let mut history = self.history.write().await;
        if let Some(mut last) = history.latest().cloned() {
            last.timestamp = Utc::now();
            history.push(last);
        }
    }

    fn tier_quote(
        &self,
        tier: FeeTier,
        prices: &FeeSample,
        conditions: &NetworkConditions,
        gas_limit: u64,
    ) -> PricedStrategy {
        let gas_price = match tier {
            FeeTier::Economy => prices.slow,
            FeeTier::Standard => prices.standard,
            FeeTier::Fast => prices.fast,
            FeeTier::Instant => prices.instant,
            FeeTier::Dynamic => prices.standard,
        }
        .max(PRICE_FLOOR_WEI);

        PricedStrategy {
            tier,
            gas_price,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            expected_confirmation_secs: expected_confirmation(conditions, tier),
            estimated_cost: gas_price * gas_limit as u128,
        }
    }

    fn dynamic_quote(
        &self,
        prediction: &FeePrediction,
        conditions: &NetworkConditions,
        gas_limit: u64,
    ) -> PricedStrategy {
        let base = prediction.next_period;
        let adjusted = match conditions.congestion {
            CongestionLevel::High | CongestionLevel::Critical => base * 130 / 100,
            CongestionLevel::Low => base * 95 / 100,
            CongestionLevel::Medium => base,
        }
        .max(PRICE_FLOOR_WEI);

        PricedStrategy {
            tier: FeeTier::Dynamic,
            gas_price: adjusted,
            max_fee_per_gas: Some(adjusted * 150 / 100),
            max_priority_fee_per_gas: Some(adjusted * 10 / 100),
            expected_confirmation_secs: expected_confirmation(conditions, FeeTier::Dynamic),
            estimated_cost: adjusted * gas_limit as u128,
        }
    }
}

fn gwei(value: u64) -> u128 {
    value as u128 * 1_000_000_000
}

fn floor_price(value: f64) -> u128 {
    if value <= PRICE_FLOOR_WEI as f64 {
        PRICE_FLOOR_WEI
    } else {
        value as u128
    }
}

fn expected_confirmation(conditions: &NetworkConditions, tier: FeeTier) -> u64 {
    let congestion_multiplier = match conditions.congestion {
        CongestionLevel::Low => 1.0,
        CongestionLevel::Medium => 1.5,
        CongestionLevel::High => 2.5,
        CongestionLevel::Critical => 4.0,
    };
    let tier_multiplier = match tier {
        FeeTier::Economy => 3.0,
        FeeTier::Standard => 1.5,
        FeeTier::Fast => 0.8,
        FeeTier::Instant => 0.5,
        FeeTier::Dynamic => 1.0,
    };
    (conditions.avg_block_time_secs * congestion_multiplier * tier_multiplier).ceil() as u64
}
