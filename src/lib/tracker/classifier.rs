//! Per-endpoint RTT classification.
//!
//! Every valid RTT goes through the sliding window, the transition tracker
//! and the adaptive thresholds before a raw classification is derived for
//! both axes. The raw values are then debounced independently into the
//! confirmed, public state. Timeouts bypass the statistics: once enough of
//! them happen in a row, both axes are forced to `Offline`/`Unknown`.

use std::time::{Duration, Instant};

use tracing::*;

use super::{
    confidence::{effective_magnitude_threshold, TransitionTracker},
    config::TrackerConfig,
    confirmation::Confirmer,
    correlation::as_millis_f64,
    statistics::{SampleOutcome, SlidingWindow, WindowStats},
    thresholds::AdaptiveThresholds,
    types::{ActivityState, Classification, ConfidenceLevel, NetworkType, UpdateCause},
};

pub struct Classifier {
    config: TrackerConfig,
    window: SlidingWindow,
    thresholds: AdaptiveThresholds,
    transitions: TransitionTracker,
    activity: Confirmer<ActivityState>,
    network: Confirmer<NetworkType>,
    consecutive_timeouts: u32,
    last_stats: Option<WindowStats>,
    raw_activity: ActivityState,
    raw_network: NetworkType,
}

impl Classifier {
    pub fn new(config: TrackerConfig) -> Self {
        let windows = config.confirmation_windows;
        let duration = config.confirmation_duration();

        Self {
            window: SlidingWindow::new(&config),
            thresholds: AdaptiveThresholds::new(&config),
            transitions: TransitionTracker::new(&config),
            activity: Confirmer::new(ActivityState::Calibrating, windows, duration),
            network: Confirmer::new(NetworkType::Unknown, windows, duration),
            consecutive_timeouts: 0,
            last_stats: None,
            raw_activity: ActivityState::Calibrating,
            raw_network: NetworkType::Unknown,
            config,
        }
    }

    /// Drop every sample, history, counter and confirmation.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Feed the RTT of an acknowledged probe.
    ///
    /// Any acknowledgement proves the device is reachable, so the timeout run
    /// is cleared even when the RTT itself is implausible and gets dropped.
    #[instrument(level = "trace", skip(self))]
    pub fn on_ack(&mut self, rtt_ms: f64, now: Instant) -> Option<Classification> {
        self.consecutive_timeouts = 0;

        if !(rtt_ms > 0.0 && rtt_ms <= self.config.max_valid_rtt_ms) {
            debug!("Dropping invalid RTT: {rtt_ms:.1} ms");
            return None;
        }

        if self.activity.confirmed() == ActivityState::Offline {
            info!("Reachable again, recalibrating");
            self.activity.force(ActivityState::Calibrating);
            self.network.force(NetworkType::Unknown);
        }

        if self.window.add_sample(rtt_ms) == SampleOutcome::BurnIn {
            self.raw_activity = ActivityState::Calibrating;
            self.raw_network = NetworkType::Unknown;
            return Some(self.classification(UpdateCause::Sample { rtt_ms }, now));
        }

        Some(self.evaluate(UpdateCause::Sample { rtt_ms }, now))
    }

    /// Record an expired probe.
    #[instrument(level = "trace", skip(self))]
    pub fn on_timeout(&mut self, waited: Duration, now: Instant) -> Classification {
        self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        debug!(
            "Probe timed out after {:.0} ms ({} in a row)",
            as_millis_f64(waited),
            self.consecutive_timeouts
        );

        if self.is_offline_run() {
            if self.activity.confirmed() != ActivityState::Offline {
                info!(
                    "Offline after {} consecutive timeouts",
                    self.consecutive_timeouts
                );
            }
            self.raw_activity = ActivityState::Offline;
            self.raw_network = NetworkType::Unknown;
            self.activity.force(ActivityState::Offline);
            self.network.force(NetworkType::Unknown);
        }

        self.classification(
            UpdateCause::Timeout {
                waited_ms: as_millis_f64(waited),
            },
            now,
        )
    }

    fn is_offline_run(&self) -> bool {
        self.consecutive_timeouts >= self.config.offline_after_timeouts
    }

    fn evaluate(&mut self, cause: UpdateCause, now: Instant) -> Classification {
        let stats = self.window.stats();

        let (raw_activity, raw_network) = match stats {
            None => (ActivityState::Calibrating, NetworkType::Unknown),
            Some(stats) => {
                self.transitions.observe(stats.median);
                self.thresholds.update(stats.median, stats.jitter);
                (
                    self.classify_activity(stats.median),
                    self.classify_network(stats.jitter),
                )
            }
        };
        trace!("Raw classification: {raw_activity} / {raw_network}, stats: {stats:?}");

        self.last_stats = stats;
        self.raw_activity = raw_activity;
        self.raw_network = raw_network;

        if let Some(activity) = self.activity.observe(raw_activity, now) {
            info!("Activity confirmed: {activity}");
        }
        if let Some(network) = self.network.observe(raw_network, now) {
            info!("Network confirmed: {network}");
        }

        self.classification(cause, now)
    }

    fn classify_activity(&self, median: f64) -> ActivityState {
        if median < self.magnitude_threshold() {
            ActivityState::Online
        } else {
            ActivityState::Standby
        }
    }

    fn classify_network(&self, jitter: f64) -> NetworkType {
        let cache = self.thresholds.cache();
        if !cache.is_computed() {
            NetworkType::Unknown
        } else if jitter > cache.jitter() {
            NetworkType::Lte
        } else {
            NetworkType::WiFi
        }
    }

    pub fn magnitude_threshold(&self) -> f64 {
        effective_magnitude_threshold(
            self.confidence(),
            self.thresholds.cache().magnitude(),
            self.config.fixed_magnitude_threshold_ms,
        )
    }

    pub fn confidence(&self) -> ConfidenceLevel {
        self.transitions.confidence_level()
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    pub fn activity(&self) -> &Confirmer<ActivityState> {
        &self.activity
    }

    pub fn network(&self) -> &Confirmer<NetworkType> {
        &self.network
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn classification(&self, cause: UpdateCause, now: Instant) -> Classification {
        Classification {
            cause,
            activity: self.activity.confirmed(),
            network: self.network.confirmed(),
            raw_activity: self.raw_activity,
            raw_network: self.raw_network,
            median_ms: self.last_stats.map(|stats| stats.median),
            jitter_ms: self.last_stats.map(|stats| stats.jitter),
            magnitude_threshold_ms: self.magnitude_threshold(),
            jitter_threshold_ms: self.thresholds.cache().jitter(),
            confidence: self.confidence(),
            transitions: self.transitions.transitions(),
            activity_confirmation: self.activity.status(now),
            network_confirmation: self.network.status(now),
            consecutive_timeouts: self.consecutive_timeouts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(start: Instant, seconds: u64) -> Instant {
        start + Duration::from_secs(seconds)
    }

    /// Feeds `rtt_ms` once per second starting at `from`, returning the last classification.
    fn feed(
        classifier: &mut Classifier,
        start: Instant,
        from: u64,
        count: u64,
        rtt_ms: f64,
    ) -> Classification {
        let mut last = None;
        for second in from..from + count {
            last = classifier.on_ack(rtt_ms, seconds(start, second));
        }
        last.unwrap()
    }

    #[test]
    fn calibrating_until_window_has_minimum_samples() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());

        // 5 burn-in samples plus 4 in the window
        for second in 0..9 {
            let classification = classifier.on_ack(300.0, seconds(start, second)).unwrap();
            assert_eq!(classification.activity, ActivityState::Calibrating);
            assert_eq!(classification.raw_activity, ActivityState::Calibrating);
            assert_eq!(classification.network, NetworkType::Unknown);
            assert_eq!(classification.median_ms, None);
        }

        let classification = classifier.on_ack(300.0, seconds(start, 9)).unwrap();
        assert_eq!(classification.raw_activity, ActivityState::Online);
        assert_eq!(classification.median_ms, Some(300.0));
        assert_eq!(classification.activity, ActivityState::Calibrating);
    }

    #[test]
    fn confirmation_needs_windows_and_time() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());

        // First statistics at second 9, pending from there
        let classification = feed(&mut classifier, start, 0, 14, 300.0);
        assert_eq!(classification.activity, ActivityState::Calibrating);
        assert!(classification.activity_confirmation.pending);
        assert_eq!(classification.activity_confirmation.progress, 80);

        let classification = classifier.on_ack(300.0, seconds(start, 14)).unwrap();
        assert_eq!(classification.activity, ActivityState::Online);
        assert_eq!(classification.network, NetworkType::WiFi);
        assert!(!classification.activity_confirmation.pending);
        assert_eq!(classification.magnitude_threshold_ms, 800.0);
        assert_eq!(classification.confidence, ConfidenceLevel::Low);
    }

    #[test]
    fn slow_window_is_standby() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());
        let classification = feed(&mut classifier, start, 0, 20, 1200.0);
        assert_eq!(classification.activity, ActivityState::Standby);
    }

    #[test]
    fn three_consecutive_timeouts_go_offline() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());
        feed(&mut classifier, start, 0, 20, 300.0);
        let waited = Duration::from_secs(10);

        let classification = classifier.on_timeout(waited, seconds(start, 30));
        assert_eq!(classification.activity, ActivityState::Online);
        let classification = classifier.on_timeout(waited, seconds(start, 40));
        assert_eq!(classification.activity, ActivityState::Online);
        assert_eq!(classification.consecutive_timeouts, 2);

        let classification = classifier.on_timeout(waited, seconds(start, 50));
        assert_eq!(classification.activity, ActivityState::Offline);
        assert_eq!(classification.network, NetworkType::Unknown);
        assert_eq!(classification.raw_activity, ActivityState::Offline);
        assert_eq!(classification.cause, UpdateCause::Timeout { waited_ms: 10_000.0 });
    }

    #[test]
    fn ack_between_timeouts_resets_the_run() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());
        feed(&mut classifier, start, 0, 20, 300.0);
        let waited = Duration::from_secs(10);

        classifier.on_timeout(waited, seconds(start, 30));
        classifier.on_timeout(waited, seconds(start, 40));
        let classification = classifier.on_ack(300.0, seconds(start, 41)).unwrap();
        assert_eq!(classification.consecutive_timeouts, 0);

        classifier.on_timeout(waited, seconds(start, 50));
        let classification = classifier.on_timeout(waited, seconds(start, 60));
        assert_eq!(classification.activity, ActivityState::Online);
    }

    #[test]
    fn invalid_rtt_is_dropped_but_proves_reachability() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());
        classifier.on_timeout(Duration::from_secs(10), start);

        assert_eq!(classifier.on_ack(0.0, start), None);
        assert_eq!(classifier.on_ack(-12.0, start), None);
        assert_eq!(classifier.on_ack(60_000.5, start), None);
        assert_eq!(classifier.consecutive_timeouts(), 0);

        assert!(classifier.on_ack(60_000.0, start).is_some());
    }

    #[test]
    fn leaving_offline_goes_through_calibrating() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());
        feed(&mut classifier, start, 0, 20, 300.0);
        for second in [30, 40, 50] {
            classifier.on_timeout(Duration::from_secs(10), seconds(start, second));
        }
        assert_eq!(classifier.activity().confirmed(), ActivityState::Offline);

        let classification = classifier.on_ack(300.0, seconds(start, 51)).unwrap();
        assert_eq!(classification.activity, ActivityState::Calibrating);
        assert_eq!(classification.network, NetworkType::Unknown);
        assert_eq!(classification.raw_activity, ActivityState::Online);

        let classification = feed(&mut classifier, start, 52, 5, 300.0);
        assert_eq!(classification.activity, ActivityState::Online);
    }

    #[test]
    fn axes_confirm_independently() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig {
            burn_in_samples: 0,
            window_capacity: 1,
            min_window_samples: 1,
            ..Default::default()
        });

        // Activity flips every window, network sees zero jitter throughout
        for (second, rtt_ms) in [300.0, 1000.0, 300.0, 1000.0].into_iter().enumerate() {
            classifier.on_ack(rtt_ms, seconds(start, second as u64));
        }
        assert_eq!(classifier.activity().pending_windows(), 1);
        assert_eq!(classifier.network().pending_windows(), 4);
        assert_eq!(classifier.network().pending_value(), Some(NetworkType::WiFi));

        classifier.on_ack(300.0, seconds(start, 4));
        let classification = classifier.on_ack(1000.0, seconds(start, 5)).unwrap();
        assert_eq!(classification.network, NetworkType::WiFi);
        assert_eq!(classification.activity, ActivityState::Calibrating);
    }

    #[test]
    fn spread_out_window_is_lte() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig {
            burn_in_samples: 0,
            window_capacity: 5,
            ..Default::default()
        });

        let classification = feed(&mut classifier, start, 0, 20, 300.0);
        assert_eq!(classification.network, NetworkType::WiFi);
        assert_eq!(classification.jitter_threshold_ms, 0.0);

        // Alternating RTTs open up the interquartile range
        let mut classifications = Vec::new();
        for second in 20..28 {
            let rtt_ms = if second % 2 == 0 { 100.0 } else { 500.0 };
            classifications.push(classifier.on_ack(rtt_ms, seconds(start, second)).unwrap());
        }

        let first_spread = &classifications[2];
        assert_eq!(first_spread.jitter_ms, Some(200.0));
        assert_eq!(first_spread.raw_network, NetworkType::Lte);
        assert_eq!(first_spread.network, NetworkType::WiFi);
        assert!(first_spread.network_confirmation.pending);

        // Pending since second 22: confirmed five seconds later
        assert_eq!(classifications[6].network, NetworkType::WiFi);
        assert_eq!(classifications[7].raw_network, NetworkType::Lte);
        assert_eq!(classifications[7].network, NetworkType::Lte);
    }

    #[test]
    fn medium_confidence_switches_to_adaptive_threshold() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig {
            burn_in_samples: 0,
            window_capacity: 1,
            min_window_samples: 1,
            ..Default::default()
        });

        let mut last = None;
        for (second, rtt_ms) in [200.0, 600.0, 200.0, 600.0].into_iter().enumerate() {
            last = classifier.on_ack(rtt_ms, seconds(start, second as u64));
        }
        let classification = last.unwrap();
        assert_eq!(classification.transitions, 1);
        assert_eq!(classification.confidence, ConfidenceLevel::Low);
        assert_eq!(classification.magnitude_threshold_ms, 800.0);

        // Second return to the 200 ms baseline
        let classification = classifier.on_ack(200.0, seconds(start, 4)).unwrap();
        assert_eq!(classification.transitions, 2);
        assert_eq!(classification.confidence, ConfidenceLevel::Medium);
        // Cached P75 from the first insertion, not refreshed yet
        assert_eq!(classification.magnitude_threshold_ms, 200.0);
        assert_eq!(classification.raw_activity, ActivityState::Standby);

        // Sixth insertion refreshes the cache: P75 of three 200s and three 600s
        let classification = classifier.on_ack(600.0, seconds(start, 5)).unwrap();
        assert_eq!(classification.magnitude_threshold_ms, 600.0);
    }

    #[test]
    fn reset_forgets_everything() {
        let start = Instant::now();
        let mut classifier = Classifier::new(TrackerConfig::default());
        feed(&mut classifier, start, 0, 20, 300.0);
        classifier.on_timeout(Duration::from_secs(10), start);

        classifier.reset();
        assert_eq!(classifier.consecutive_timeouts(), 0);
        assert_eq!(classifier.activity().confirmed(), ActivityState::Calibrating);
        let classification = classifier.on_ack(300.0, start).unwrap();
        assert_eq!(classification.median_ms, None);
    }
}
