//! Online RTT classification.
//!
//! A [`Tracker`] owns one session per tracked target. Each session probes its
//! target through a [`ProbeTransport`], correlates acknowledgements with the
//! probes it sent, and feeds the resulting RTTs (or timeouts) into its own
//! [`classifier::Classifier`]. Classification updates are published on a
//! broadcast channel shared by all sessions.

pub mod classifier;
pub mod confidence;
pub mod config;
pub mod confirmation;
pub mod correlation;
pub mod error;
pub mod manager;
pub mod session;
pub mod statistics;
pub mod thresholds;
pub mod types;

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tokio::sync::broadcast;
use tracing::*;

use crate::transport::ProbeTransport;

use self::{
    config::TrackerConfig,
    error::{Error, Result},
    session::{Session, SessionEvent, SessionHandle},
    types::{AckEvent, AckKind, ClassificationUpdate, TargetId},
};

#[derive(Clone)]
pub struct Tracker {
    config: TrackerConfig,
    sessions: Arc<RwLock<HashMap<TargetId, SessionHandle>>>,
    updates: broadcast::Sender<ClassificationUpdate>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let (updates, _receiver) = broadcast::channel(1024);
        Ok(Self {
            config,
            sessions: Default::default(),
            updates,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[instrument(level = "debug", skip(self, transport))]
    pub fn start(&self, target: TargetId, transport: Arc<dyn ProbeTransport>) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&target) {
            return Err(Error::AlreadyTracking(target));
        }

        info!("Tracking {target}");
        let handle = Session::spawn(
            target.clone(),
            self.config.clone(),
            transport,
            self.updates.clone(),
        );
        sessions.insert(target, handle);

        Ok(())
    }

    /// Stop probing `target` and drop all of its state.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&self, target: &TargetId) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target)
            .ok_or_else(|| Error::NotTracking(target.clone()))?;

        handle.stop(target).await?;
        info!("Stopped tracking {target}");

        Ok(())
    }

    pub async fn stop_all(&self) {
        let handles: Vec<(TargetId, SessionHandle)> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let results = futures::future::join_all(
            handles
                .into_iter()
                .map(|(target, handle)| async move { handle.stop(&target).await }),
        )
        .await;

        for error in results.into_iter().filter_map(|result| result.err()) {
            warn!("{error}");
        }
    }

    /// Route an acknowledgement to the session of its sender.
    ///
    /// Only device acknowledgements carry timing information about the
    /// target; everything else is ignored. Returns whether the event was
    /// forwarded.
    pub fn handle_ack(&self, event: AckEvent) -> bool {
        if event.kind != AckKind::DeviceReceived {
            trace!("Ignoring {:?} ack for probe {}", event.kind, event.probe_id);
            return false;
        }

        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = sessions.get(&event.remote) else {
            debug!(
                "Ignoring ack from untracked {} for probe {}",
                event.remote, event.probe_id
            );
            return false;
        };

        session.forward(SessionEvent::Ack {
            probe_id: event.probe_id,
            received_at: event.received_at,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClassificationUpdate> {
        self.updates.subscribe()
    }

    pub fn latest(&self, target: &TargetId) -> Option<ClassificationUpdate> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .and_then(SessionHandle::latest)
    }

    pub fn is_tracking(&self, target: &TargetId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(target)
    }

    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        targets.sort();
        targets
    }
}
