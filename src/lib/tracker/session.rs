use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use rand::Rng;
use tokio::{
    sync::{broadcast, mpsc},
    task::{AbortHandle, JoinHandle},
    time::Instant,
};
use tracing::*;

use super::{
    classifier::Classifier,
    config::TrackerConfig,
    correlation::ProbeTable,
    error::{Error, Result},
    types::{Classification, ClassificationUpdate, ProbeId, TargetId},
};
use crate::transport::ProbeTransport;

#[derive(Debug)]
pub(crate) enum SessionEvent {
    Ack {
        probe_id: ProbeId,
        received_at: std::time::Instant,
    },
    TimerExpired {
        probe_id: ProbeId,
    },
    Stop,
}

/// Owner side of a running tracking session.
pub(crate) struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    task: JoinHandle<()>,
    latest: Arc<RwLock<Option<ClassificationUpdate>>>,
}

impl SessionHandle {
    pub fn forward(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn latest(&self) -> Option<ClassificationUpdate> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn stop(self, target: &TargetId) -> Result<()> {
        let _ = self.events.send(SessionEvent::Stop);
        self.task.await.map_err(|error| {
            error!("Session for {target} did not end cleanly: {error:?}");
            Error::SessionLost(target.clone())
        })
    }
}

/// Probe loop and classification state of one tracked target.
///
/// Probes are sent one at a time: the next probe is scheduled once the
/// previous one was acknowledged or timed out.
pub(crate) struct Session {
    target: TargetId,
    config: TrackerConfig,
    transport: Arc<dyn ProbeTransport>,
    classifier: Classifier,
    // Weak, so the channel closes once the owning handle is gone
    events_sender: mpsc::WeakUnboundedSender<SessionEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    updates: broadcast::Sender<ClassificationUpdate>,
    latest: Arc<RwLock<Option<ClassificationUpdate>>>,
}

impl Session {
    pub fn spawn(
        target: TargetId,
        config: TrackerConfig,
        transport: Arc<dyn ProbeTransport>,
        updates: broadcast::Sender<ClassificationUpdate>,
    ) -> SessionHandle {
        let (events_sender, events) = mpsc::unbounded_channel();
        let latest = Arc::new(RwLock::new(None));

        let session = Self {
            classifier: Classifier::new(config.clone()),
            target,
            config,
            transport,
            events_sender: events_sender.downgrade(),
            events,
            updates,
            latest: latest.clone(),
        };

        SessionHandle {
            events: events_sender,
            task: tokio::spawn(session.run()),
            latest,
        }
    }

    #[instrument(level = "debug", skip(self), fields(target = %self.target))]
    async fn run(mut self) {
        debug!("Session started");

        let target = self.target.clone();
        let mut probes = scopeguard::guard(ProbeTable::<AbortHandle>::default(), move |mut probes| {
            let cancelled = probes.cancel_all();
            debug!("Session for {target} ended, {cancelled} probe timer(s) cancelled");
        });

        let mut next_probe = Some(Instant::now());
        loop {
            let deadline = next_probe;
            tokio::select! {
                _ = sleep_until(deadline) => {
                    next_probe = None;
                    self.send_probe(&mut probes).await;
                }
                event = self.events.recv() => match event {
                    Some(SessionEvent::Ack { probe_id, received_at }) => {
                        let Some(rtt_ms) = probes.on_ack(&probe_id, received_at) else {
                            continue;
                        };
                        trace!("Probe {probe_id} acknowledged after {rtt_ms:.1} ms");
                        if let Some(classification) = self.classifier.on_ack(rtt_ms, received_at) {
                            self.publish(classification);
                        }
                        next_probe = Some(self.next_probe_at());
                    }
                    Some(SessionEvent::TimerExpired { probe_id }) => {
                        let now = Instant::now().into_std();
                        let Some(waited) = probes.on_timeout(&probe_id, now) else {
                            continue;
                        };
                        let classification = self.classifier.on_timeout(waited, now);
                        self.publish(classification);
                        next_probe = Some(self.next_probe_at());
                    }
                    Some(SessionEvent::Stop) => break,
                    None => {
                        debug!("Session handle dropped without stop");
                        break;
                    }
                },
            }
        }
    }

    async fn send_probe(&mut self, probes: &mut ProbeTable<AbortHandle>) {
        let sent_at = Instant::now();

        // A failed send is only ever visible to the classifier as a timeout
        let probe_id = match self.transport.send_probe(&self.target).await {
            Ok(probe_id) => {
                trace!("Probe {probe_id} sent");
                probe_id
            }
            Err(error) => {
                warn!("Failed to send probe to {}: {error:#}", self.target);
                ProbeId::local()
            }
        };

        let timer = self.arm_timer(probe_id.clone());
        probes.on_sent(probe_id, sent_at.into_std(), timer);
    }

    fn arm_timer(&self, probe_id: ProbeId) -> AbortHandle {
        let events = self.events_sender.clone();
        let timeout = self.config.probe_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(SessionEvent::TimerExpired { probe_id });
            }
        })
        .abort_handle()
    }

    fn next_probe_at(&self) -> Instant {
        Instant::now() + probe_delay(&self.config, &mut rand::thread_rng())
    }

    fn publish(&self, classification: Classification) {
        let update = ClassificationUpdate {
            target: self.target.clone(),
            timestamp: chrono::Utc::now(),
            classification,
        };

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(update.clone());

        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn probe_delay(config: &TrackerConfig, rng: &mut impl Rng) -> Duration {
    let jitter = if config.probe_interval_jitter_ms > 0 {
        rng.gen_range(0..=config.probe_interval_jitter_ms)
    } else {
        0
    };
    Duration::from_millis(config.probe_interval_ms + jitter)
}
