use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Every tunable of the classification engine and the probing cadence.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Delay between a resolved probe and the next one.
    pub probe_interval_ms: u64,
    /// Upper bound of the uniform random delay added to `probe_interval_ms`.
    pub probe_interval_jitter_ms: u64,
    /// How long to wait for a device acknowledgement before declaring a timeout.
    pub probe_timeout_ms: u64,
    /// Consecutive timeouts needed before reporting `Offline`.
    pub offline_after_timeouts: u32,
    /// RTTs above this are considered malformed and dropped.
    pub max_valid_rtt_ms: f64,

    /// Samples discarded at session start.
    pub burn_in_samples: usize,
    pub window_capacity: usize,
    pub min_window_samples: usize,

    pub history_capacity: usize,
    /// History insertions between two threshold recomputations.
    pub threshold_refresh_interval: usize,
    pub threshold_percentile: f64,
    /// History size below which every median is accepted.
    pub outlier_min_history: usize,
    pub outlier_iqr_factor: f64,

    pub transition_percent: f64,
    pub medium_confidence_transitions: u64,
    pub high_confidence_transitions: u64,
    /// Magnitude threshold used while confidence is low.
    pub fixed_magnitude_threshold_ms: f64,

    pub confirmation_windows: u32,
    pub confirmation_duration_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 2000,
            probe_interval_jitter_ms: 100,
            probe_timeout_ms: 10_000,
            offline_after_timeouts: 3,
            max_valid_rtt_ms: 60_000.0,
            burn_in_samples: 5,
            window_capacity: 20,
            min_window_samples: 5,
            history_capacity: 2000,
            threshold_refresh_interval: 5,
            threshold_percentile: 75.0,
            outlier_min_history: 10,
            outlier_iqr_factor: 3.0,
            transition_percent: 25.0,
            medium_confidence_transitions: 2,
            high_confidence_transitions: 4,
            fixed_magnitude_threshold_ms: 800.0,
            confirmation_windows: 3,
            confirmation_duration_ms: 5000,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_capacity == 0 || self.history_capacity == 0 {
            return Err(Error::InvalidConfig(
                "window and history capacities must be at least 1".to_string(),
            ));
        }
        if self.min_window_samples == 0 || self.min_window_samples > self.window_capacity {
            return Err(Error::InvalidConfig(format!(
                "min_window_samples must be within 1..={}, got {}",
                self.window_capacity, self.min_window_samples
            )));
        }
        if self.threshold_refresh_interval == 0 {
            return Err(Error::InvalidConfig(
                "threshold_refresh_interval must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.threshold_percentile) {
            return Err(Error::InvalidConfig(format!(
                "threshold_percentile must be within [0, 100], got {}",
                self.threshold_percentile
            )));
        }
        if self.medium_confidence_transitions > self.high_confidence_transitions {
            return Err(Error::InvalidConfig(format!(
                "medium confidence boundary ({}) is above the high one ({})",
                self.medium_confidence_transitions, self.high_confidence_transitions
            )));
        }
        if self.max_valid_rtt_ms <= 0.0 || self.fixed_magnitude_threshold_ms <= 0.0 {
            return Err(Error::InvalidConfig(
                "RTT bounds and the fixed magnitude threshold must be positive".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 || self.offline_after_timeouts == 0 {
            return Err(Error::InvalidConfig(
                "probe_timeout_ms and offline_after_timeouts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn confirmation_duration(&self) -> Duration {
        Duration::from_millis(self.confirmation_duration_ms)
    }
}
