use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tracing::*;

use super::types::ProbeId;

/// Handle to an armed probe timer.
pub trait ProbeTimer {
    fn cancel(self);
}

impl ProbeTimer for tokio::task::AbortHandle {
    fn cancel(self) {
        self.abort();
    }
}

/// No timer, for callers that deliver timeouts themselves.
impl ProbeTimer for () {
    fn cancel(self) {}
}

pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[derive(Debug)]
struct PendingProbe<T> {
    sent_at: Instant,
    timer: T,
}

/// Outstanding probes, each owning exactly one timer.
///
/// Both completion paths remove the record, so whichever of ACK and timeout
/// arrives second finds nothing and is ignored.
#[derive(Debug)]
pub struct ProbeTable<T: ProbeTimer> {
    pending: HashMap<ProbeId, PendingProbe<T>>,
}

impl<T: ProbeTimer> Default for ProbeTable<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<T: ProbeTimer> ProbeTable<T> {
    pub fn on_sent(&mut self, probe_id: ProbeId, sent_at: Instant, timer: T) {
        let probe = PendingProbe { sent_at, timer };
        if let Some(previous) = self.pending.insert(probe_id.clone(), probe) {
            warn!("Probe {probe_id} registered twice, dropping the previous timer");
            previous.timer.cancel();
        }
    }

    /// RTT in milliseconds, negative if the clocks disagree. `None` for unknown probes.
    pub fn on_ack(&mut self, probe_id: &ProbeId, received_at: Instant) -> Option<f64> {
        let Some(probe) = self.pending.remove(probe_id) else {
            debug!("Ignoring ACK for unknown probe {probe_id}");
            return None;
        };
        probe.timer.cancel();

        let rtt_ms = match received_at.checked_duration_since(probe.sent_at) {
            Some(elapsed) => as_millis_f64(elapsed),
            None => -as_millis_f64(probe.sent_at.duration_since(received_at)),
        };
        Some(rtt_ms)
    }

    /// Elapsed wait of an expired probe. `None` if it was already resolved.
    pub fn on_timeout(&mut self, probe_id: &ProbeId, now: Instant) -> Option<Duration> {
        let probe = self.pending.remove(probe_id)?;
        Some(now.saturating_duration_since(probe.sent_at))
    }

    /// Cancel every outstanding timer. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, probe) in self.pending.drain() {
            probe.timer.cancel();
        }
        count
    }

    pub fn contains(&self, probe_id: &ProbeId) -> bool {
        self.pending.contains_key(probe_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
