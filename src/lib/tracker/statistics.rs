//! Order statistics over RTT samples.
//!
//! The sliding window keeps the most recent samples in insertion order and
//! derives two window-level metrics from them:
//!
//! - **magnitude**: the median RTT,
//! - **jitter**: the interquartile range of the RTTs.
//!
//! Percentiles use linear interpolation at fractional index `p/100 × (n-1)`
//! over the sorted values, not nearest-rank.

use ringbuffer::{AllocRingBuffer, RingBuffer};
use serde::Serialize;
use tracing::*;

use super::config::TrackerConfig;

pub(crate) fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// Percentile of an already sorted slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let (first, last) = (sorted.first()?, sorted.last()?);
    if sorted.len() == 1 {
        return Some(*first);
    }

    let index = (p / 100.0) * (sorted.len() - 1) as f64;
    if index <= 0.0 {
        return Some(*first);
    }
    if index >= (sorted.len() - 1) as f64 {
        return Some(*last);
    }

    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    let weight = index - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// Median of an already sorted slice.
pub fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// First and third quartiles of an already sorted slice.
pub fn quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    Some((percentile(sorted, 25.0)?, percentile(sorted, 75.0)?))
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WindowStats {
    pub median: f64,
    pub jitter: f64,
    pub samples: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleOutcome {
    Accepted,
    /// Dropped as part of the connection-establishment burn-in.
    BurnIn,
}

pub struct SlidingWindow {
    samples: AllocRingBuffer<f64>,
    burn_in_remaining: usize,
    min_samples: usize,
}

impl SlidingWindow {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            samples: AllocRingBuffer::new(config.window_capacity),
            burn_in_remaining: config.burn_in_samples,
            min_samples: config.min_window_samples,
        }
    }

    pub fn add_sample(&mut self, rtt_ms: f64) -> SampleOutcome {
        if self.burn_in_remaining > 0 {
            self.burn_in_remaining -= 1;
            trace!(
                "Burn-in sample discarded: {rtt_ms:.1} ms ({} left)",
                self.burn_in_remaining
            );
            return SampleOutcome::BurnIn;
        }

        self.samples.push(rtt_ms);
        SampleOutcome::Accepted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.to_vec()
    }

    /// `None` while the window holds fewer than the minimum sample count.
    pub fn stats(&self) -> Option<WindowStats> {
        if self.samples.len() < self.min_samples {
            return None;
        }

        let values = sorted(self.samples.iter().copied());
        let median = median(&values)?;
        let (q1, q3) = quartiles(&values)?;

        Some(WindowStats {
            median,
            jitter: q3 - q1,
            samples: values.len(),
        })
    }
}
