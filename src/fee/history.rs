//! Bounded fee sample history and the statistics used for prediction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Price tiers observed or estimated at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSample {
    pub timestamp: DateTime<Utc>,
    /// Prices in wei per gas unit
    pub slow: u128,
    pub standard: u128,
    pub fast: u128,
    pub instant: u128,
}

impl FeeSample {
    /// Derive a sample from a single base price using the conventional
    /// tier spreads (80% / 100% / 130% / 200%)
    pub fn from_base(base: u128) -> Self {
        Self {
            timestamp: Utc::now(),
            slow: base * 80 / 100,
            standard: base,
            fast: base * 130 / 100,
            instant: base * 2,
        }
    }
}

/// Append-only ring of fee samples; oldest evicted at capacity
pub struct FeeHistory {
    capacity: usize,
    samples: VecDeque<FeeSample>,
}

impl FeeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: FeeSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&FeeSample> {
        self.samples.back()
    }

    /// Standard-tier prices of the last `n` samples, oldest first
    pub fn recent_standard(&self, n: usize) -> Vec<u128> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).map(|s| s.standard).collect()
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    mean(&values.iter().map(|v| (v - m).powi(2)).collect::<Vec<_>>())
}

/// Least-squares linear fit over `values`, extrapolated `steps_ahead`
/// periods past the end of the series
pub(crate) fn extrapolate(values: &[f64], steps_ahead: usize) -> f64 {
    let n = values.len();
    if n < 2 {
        return values.last().copied().unwrap_or(0.0);
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let nf = n as f64;
    let denom = nf * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return mean(values);
    }
    let slope = (nf * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / nf;

    intercept + slope * (nf - 1.0 + steps_ahead as f64)
}
