use std::time::{Duration, Instant};

use super::types::AxisConfirmation;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Pending<T> {
    value: T,
    since: Instant,
    windows: u32,
}

/// Hysteresis over a stream of raw classifications.
///
/// A raw value only becomes the confirmed one after it was observed in a
/// consecutive run of at least `required_windows` evaluations spanning at
/// least `required_duration`.
#[derive(Clone, Debug)]
pub struct Confirmer<T> {
    confirmed: T,
    pending: Option<Pending<T>>,
    required_windows: u32,
    required_duration: Duration,
}

impl<T: Copy + PartialEq> Confirmer<T> {
    pub fn new(initial: T, required_windows: u32, required_duration: Duration) -> Self {
        Self {
            confirmed: initial,
            pending: None,
            required_windows,
            required_duration,
        }
    }

    /// Feed one raw observation. Returns the newly confirmed value, if any.
    pub fn observe(&mut self, raw: T, now: Instant) -> Option<T> {
        if raw == self.confirmed {
            self.pending = None;
            return None;
        }

        match self.pending.as_mut() {
            Some(pending) if pending.value == raw => {
                pending.windows += 1;
                let elapsed = now.saturating_duration_since(pending.since);
                if pending.windows >= self.required_windows && elapsed >= self.required_duration {
                    self.confirmed = raw;
                    self.pending = None;
                    return Some(raw);
                }
            }
            _ => {
                self.pending = Some(Pending {
                    value: raw,
                    since: now,
                    windows: 1,
                });
            }
        }
        None
    }

    /// Set the confirmed value immediately, dropping any pending candidate.
    pub fn force(&mut self, value: T) {
        self.confirmed = value;
        self.pending = None;
    }

    pub fn confirmed(&self) -> T {
        self.confirmed
    }

    pub fn pending_value(&self) -> Option<T> {
        self.pending.map(|pending| pending.value)
    }

    pub fn pending_windows(&self) -> u32 {
        self.pending.map(|pending| pending.windows).unwrap_or(0)
    }

    pub fn status(&self, now: Instant) -> AxisConfirmation {
        let Some(pending) = self.pending else {
            return AxisConfirmation::default();
        };

        let window_progress = if self.required_windows == 0 {
            100.0
        } else {
            (pending.windows as f64 / self.required_windows as f64 * 100.0).min(100.0)
        };
        let time_progress = if self.required_duration.is_zero() {
            100.0
        } else {
            let elapsed = now.saturating_duration_since(pending.since);
            (elapsed.as_secs_f64() / self.required_duration.as_secs_f64() * 100.0).min(100.0)
        };

        AxisConfirmation {
            pending: true,
            progress: window_progress.min(time_progress).floor() as u8,
        }
    }
}
