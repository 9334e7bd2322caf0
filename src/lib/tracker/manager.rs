use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;
use tracing::*;

use super::{
    config::TrackerConfig,
    types::{AckEvent, ClassificationUpdate, TargetId},
    Tracker,
};
use crate::transport::ProbeTransport;

#[derive(Default)]
struct Manager {
    tracker: Option<Tracker>,
}

lazy_static! {
    static ref MANAGER: Arc<Mutex<Manager>> = Default::default();
}

// Construct our manager, should be done inside main
#[instrument(level = "debug")]
pub fn init(config: TrackerConfig) -> Result<()> {
    let tracker = Tracker::new(config)?;
    let previous = MANAGER
        .lock()
        .map_err(|_| anyhow!("Tracker manager poisoned"))?
        .tracker
        .replace(tracker);

    if let Some(previous) = previous {
        warn!("Tracker manager re-initialized, dropping {} session(s)", previous.targets().len());
        tokio::spawn(async move { previous.stop_all().await });
    }

    Ok(())
}

fn tracker() -> Result<Tracker> {
    MANAGER
        .lock()
        .map_err(|_| anyhow!("Tracker manager poisoned"))?
        .tracker
        .clone()
        .ok_or_else(|| anyhow!("Tracker manager was not initialized"))
}

pub fn start_tracking(target: TargetId, transport: Arc<dyn ProbeTransport>) -> Result<()> {
    Ok(tracker()?.start(target, transport)?)
}

pub async fn stop_tracking(target: &TargetId) -> Result<()> {
    Ok(tracker()?.stop(target).await?)
}

pub async fn stop_all() -> Result<()> {
    tracker()?.stop_all().await;
    Ok(())
}

pub fn handle_ack(event: AckEvent) -> bool {
    match tracker() {
        Ok(tracker) => tracker.handle_ack(event),
        Err(error) => {
            debug!("Dropping ack for probe {}: {error}", event.probe_id);
            false
        }
    }
}

pub fn subscribe() -> Result<broadcast::Receiver<ClassificationUpdate>> {
    Ok(tracker()?.subscribe())
}

pub fn latest(target: &TargetId) -> Option<ClassificationUpdate> {
    tracker().ok()?.latest(target)
}

pub fn targets() -> Vec<TargetId> {
    tracker().map(|tracker| tracker.targets()).unwrap_or_default()
}
