use ringbuffer::{AllocRingBuffer, RingBuffer};
use tracing::*;

use super::{
    config::TrackerConfig,
    statistics::{percentile, quartiles, sorted},
};

/// Cached percentile thresholds with explicit staleness.
///
/// Recomputing sorts the full history, so a refresh is only due once
/// `refresh_interval` insertions have accumulated, or when nothing was ever
/// computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdCache {
    magnitude: f64,
    jitter: f64,
    computed: bool,
    insertions_since_refresh: usize,
    refresh_interval: usize,
}

impl ThresholdCache {
    pub fn new(refresh_interval: usize) -> Self {
        Self {
            magnitude: 0.0,
            jitter: 0.0,
            computed: false,
            insertions_since_refresh: 0,
            refresh_interval,
        }
    }

    pub fn note_insertion(&mut self) {
        self.insertions_since_refresh += 1;
    }

    pub fn is_stale(&self) -> bool {
        !self.computed || self.insertions_since_refresh >= self.refresh_interval
    }

    pub fn refresh(&mut self, magnitude: f64, jitter: f64) {
        self.magnitude = magnitude;
        self.jitter = jitter;
        self.computed = true;
        self.insertions_since_refresh = 0;
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    /// Zero until the first refresh.
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Zero until the first refresh.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

/// Histories of window-level statistics and the thresholds derived from them.
pub struct AdaptiveThresholds {
    medians: AllocRingBuffer<f64>,
    jitters: AllocRingBuffer<f64>,
    cache: ThresholdCache,
    percentile: f64,
    outlier_min_history: usize,
    outlier_iqr_factor: f64,
}

impl AdaptiveThresholds {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            medians: AllocRingBuffer::new(config.history_capacity),
            jitters: AllocRingBuffer::new(config.history_capacity),
            cache: ThresholdCache::new(config.threshold_refresh_interval),
            percentile: config.threshold_percentile,
            outlier_min_history: config.outlier_min_history,
            outlier_iqr_factor: config.outlier_iqr_factor,
        }
    }

    /// Record one window evaluation. Returns whether the median entered the history.
    pub fn update(&mut self, median: f64, jitter: f64) -> bool {
        let accepted = match self.outlier_fence() {
            Some(fence) if median > fence => {
                debug!("Median {median:.1} ms kept out of history, above fence {fence:.1} ms");
                false
            }
            _ => {
                self.medians.push(median);
                true
            }
        };
        self.jitters.push(jitter);
        self.cache.note_insertion();

        if self.cache.is_stale() {
            self.recompute();
        }

        accepted
    }

    /// `Q3 + k×IQR` of the median history, once it is long enough to mean anything.
    fn outlier_fence(&self) -> Option<f64> {
        if self.medians.len() < self.outlier_min_history {
            return None;
        }
        let (q1, q3) = quartiles(&sorted(self.medians.iter().copied()))?;
        Some(q3 + self.outlier_iqr_factor * (q3 - q1))
    }

    fn recompute(&mut self) {
        let magnitude =
            percentile(&sorted(self.medians.iter().copied()), self.percentile).unwrap_or(0.0);
        let jitter =
            percentile(&sorted(self.jitters.iter().copied()), self.percentile).unwrap_or(0.0);
        trace!("Thresholds recomputed: magnitude {magnitude:.1} ms, jitter {jitter:.1} ms");
        self.cache.refresh(magnitude, jitter);
    }

    pub fn cache(&self) -> &ThresholdCache {
        &self.cache
    }

    pub fn median_history(&self) -> Vec<f64> {
        self.medians.to_vec()
    }

    pub fn jitter_history(&self) -> Vec<f64> {
        self.jitters.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> AdaptiveThresholds {
        AdaptiveThresholds::new(&TrackerConfig::default())
    }

    #[test]
    fn first_update_computes_thresholds() {
        let mut thresholds = thresholds();
        assert!(!thresholds.cache().is_computed());

        thresholds.update(300.0, 40.0);
        assert!(thresholds.cache().is_computed());
        assert_eq!(thresholds.cache().magnitude(), 300.0);
        assert_eq!(thresholds.cache().jitter(), 40.0);
    }

    #[test]
    fn recomputation_is_throttled() {
        let mut thresholds = thresholds();
        thresholds.update(100.0, 10.0);

        for _ in 0..4 {
            thresholds.update(500.0, 50.0);
            assert_eq!(thresholds.cache().magnitude(), 100.0);
        }

        // Fifth insertion since the last refresh
        thresholds.update(500.0, 50.0);
        assert_eq!(thresholds.cache().magnitude(), 500.0);
        assert_eq!(thresholds.cache().jitter(), 50.0);
    }

    #[test]
    fn cache_is_stale_until_computed_and_after_interval() {
        let mut cache = ThresholdCache::new(2);
        assert!(cache.is_stale());

        cache.refresh(1.0, 2.0);
        cache.note_insertion();
        assert!(!cache.is_stale());
        cache.note_insertion();
        assert!(cache.is_stale());

        cache.refresh(3.0, 4.0);
        assert!(!cache.is_stale());
        assert_eq!((cache.magnitude(), cache.jitter()), (3.0, 4.0));
    }

    #[test]
    fn short_history_accepts_every_median() {
        let mut thresholds = thresholds();
        for median in [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0] {
            assert!(thresholds.update(median, 10.0));
        }
        // Nine points: the fence is not active yet
        assert!(thresholds.update(50_000.0, 10.0));
        assert_eq!(thresholds.median_history().len(), 10);
    }

    #[test]
    fn outliers_are_kept_out_of_median_history_only() {
        let mut thresholds = thresholds();
        for index in 0..10 {
            thresholds.update(200.0 + index as f64 * 10.0, 20.0);
        }

        assert!(!thresholds.update(5_000.0, 900.0));
        assert_eq!(thresholds.median_history().len(), 10);
        assert_eq!(thresholds.jitter_history().len(), 11);
        assert_eq!(thresholds.jitter_history().last(), Some(&900.0));

        assert!(thresholds.update(260.0, 20.0));
        assert_eq!(thresholds.median_history().len(), 11);
    }

    #[test]
    fn history_is_bounded() {
        let mut thresholds = AdaptiveThresholds::new(&TrackerConfig {
            history_capacity: 3,
            ..Default::default()
        });
        for median in [1.0, 2.0, 3.0, 4.0] {
            thresholds.update(median, median);
        }
        assert_eq!(thresholds.median_history(), vec![2.0, 3.0, 4.0]);
    }
}
