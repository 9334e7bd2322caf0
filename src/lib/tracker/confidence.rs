use tracing::*;

use super::{config::TrackerConfig, types::ConfidenceLevel};

/// Counts excursions of the window magnitude away from a stable baseline.
///
/// An excursion is only credited once the magnitude returns within
/// `transition_percent` of the same baseline it departed from.
#[derive(Clone, Debug)]
pub struct TransitionTracker {
    last_stable_median: Option<f64>,
    in_transition: bool,
    transitions: u64,
    transition_percent: f64,
    medium_boundary: u64,
    high_boundary: u64,
}

impl TransitionTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            last_stable_median: None,
            in_transition: false,
            transitions: 0,
            transition_percent: config.transition_percent,
            medium_boundary: config.medium_confidence_transitions,
            high_boundary: config.high_confidence_transitions,
        }
    }

    pub fn observe(&mut self, median: f64) {
        let baseline = match self.last_stable_median {
            Some(baseline) if baseline > 0.0 => baseline,
            _ => {
                self.last_stable_median = Some(median);
                return;
            }
        };

        let change_percent = ((median - baseline) / baseline).abs() * 100.0;
        if change_percent > self.transition_percent {
            if !self.in_transition {
                trace!("Magnitude left baseline {baseline:.1} ms: {median:.1} ms");
            }
            self.in_transition = true;
        } else if self.in_transition {
            self.in_transition = false;
            self.transitions += 1;
            self.last_stable_median = Some(median);
            debug!(
                "Transition #{} completed, baseline now {median:.1} ms",
                self.transitions
            );
        }
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn in_transition(&self) -> bool {
        self.in_transition
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        confidence_level(self.transitions, self.medium_boundary, self.high_boundary)
    }
}

pub fn confidence_level(
    transitions: u64,
    medium_boundary: u64,
    high_boundary: u64,
) -> ConfidenceLevel {
    if transitions < medium_boundary {
        ConfidenceLevel::Low
    } else if transitions < high_boundary {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::High
    }
}

/// Magnitude threshold used for classification at the given confidence.
pub fn effective_magnitude_threshold(
    confidence: ConfidenceLevel,
    adaptive_threshold: f64,
    fixed_threshold: f64,
) -> f64 {
    match confidence {
        ConfidenceLevel::Low => fixed_threshold,
        _ if adaptive_threshold <= 0.0 => fixed_threshold,
        _ => adaptive_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TransitionTracker {
        TransitionTracker::new(&TrackerConfig::default())
    }

    #[test]
    fn level_boundaries() {
        let levels: Vec<ConfidenceLevel> = (0..6)
            .map(|count| confidence_level(count, 2, 4))
            .collect();
        assert_eq!(
            levels,
            vec![
                ConfidenceLevel::Low,
                ConfidenceLevel::Low,
                ConfidenceLevel::Medium,
                ConfidenceLevel::Medium,
                ConfidenceLevel::High,
                ConfidenceLevel::High,
            ]
        );
    }

    #[test]
    fn departure_alone_is_not_a_transition() {
        let mut tracker = tracker();
        tracker.observe(200.0);
        for _ in 0..10 {
            tracker.observe(400.0);
        }
        assert_eq!(tracker.transitions(), 0);
        assert!(tracker.in_transition());
    }

    #[test]
    fn departure_and_return_counts_once() {
        let mut tracker = tracker();
        tracker.observe(200.0);
        tracker.observe(400.0);
        tracker.observe(420.0);
        tracker.observe(210.0);
        tracker.observe(205.0);
        assert_eq!(tracker.transitions(), 1);
        assert!(!tracker.in_transition());
    }

    #[test]
    fn baseline_moves_to_the_returning_value() {
        let mut tracker = tracker();
        tracker.observe(200.0);
        tracker.observe(400.0);
        tracker.observe(240.0);
        assert_eq!(tracker.transitions(), 1);

        // 290 is within 25% of the new 240 baseline
        tracker.observe(290.0);
        assert_eq!(tracker.transitions(), 1);
        assert!(!tracker.in_transition());
    }

    #[test]
    fn stable_signal_never_transitions() {
        let mut tracker = tracker();
        for median in [200.0, 210.0, 190.0, 240.0, 160.0] {
            tracker.observe(median);
        }
        assert_eq!(tracker.transitions(), 0);
        assert_eq!(tracker.confidence_level(), ConfidenceLevel::Low);
    }

    #[test]
    fn effective_threshold_follows_confidence() {
        assert_eq!(effective_magnitude_threshold(ConfidenceLevel::Low, 300.0, 800.0), 800.0);
        assert_eq!(effective_magnitude_threshold(ConfidenceLevel::Medium, 300.0, 800.0), 300.0);
        assert_eq!(effective_magnitude_threshold(ConfidenceLevel::High, 300.0, 800.0), 300.0);
        assert_eq!(effective_magnitude_threshold(ConfidenceLevel::High, 0.0, 800.0), 800.0);
    }
}
