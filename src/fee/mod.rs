//! Fee strategist module
//!
//! Converts raw fee history into actionable prices:
//! - Bounded sample history with oracle polling
//! - Congestion classification from recent samples
//! - Least-squares short-horizon price prediction
//! - Urgency, batch and budget-constrained quoting

mod history;
mod strategist;

pub use history::{FeeHistory, FeeSample};
pub use strategist::{
    CongestionLevel, FeePrediction, FeeSnapshot, FeeStrategist, FeeTier, NetworkConditions,
    PriceTrend, PricedStrategy, Urgency,
};

use crate::error::SchedulerResult;
use async_trait::async_trait;

/// External fee price source, polled on a fixed interval
#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn current_price(&self) -> SchedulerResult<FeeSample>;
}
