use std::{collections::HashMap, sync::Mutex, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::*;

use super::ProbeTransport;
use crate::tracker::types::{AckEvent, AckKind, ProbeId, TargetId};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum SimulatedLink {
    Wifi,
    Lte,
}

/// Timing behaviour of a simulated device.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceProfile {
    pub active_rtt_ms: f64,
    pub idle_rtt_ms: f64,
    /// Half-width of the uniform noise added to every RTT.
    pub spread_ms: f64,
    pub server_ack_delay_ms: f64,
    /// Probability of a probe never reaching the device.
    pub loss_rate: f64,
    /// Probes per activity phase before switching between active and idle.
    pub phase_probes: u64,
}

impl DeviceProfile {
    pub fn for_link(link: SimulatedLink) -> Self {
        match link {
            SimulatedLink::Wifi => Self {
                active_rtt_ms: 250.0,
                idle_rtt_ms: 1100.0,
                spread_ms: 40.0,
                server_ack_delay_ms: 40.0,
                loss_rate: 0.01,
                phase_probes: 60,
            },
            SimulatedLink::Lte => Self {
                active_rtt_ms: 450.0,
                idle_rtt_ms: 1600.0,
                spread_ms: 300.0,
                server_ack_delay_ms: 80.0,
                loss_rate: 0.03,
                phase_probes: 60,
            },
        }
    }

    fn sample_rtt(&self, probe_index: u64, rng: &mut impl Rng) -> f64 {
        let phase = probe_index / self.phase_probes.max(1);
        let base = if phase % 2 == 0 {
            self.active_rtt_ms
        } else {
            self.idle_rtt_ms
        };
        let noise = if self.spread_ms > 0.0 {
            rng.gen_range(-self.spread_ms..=self.spread_ms)
        } else {
            0.0
        };
        (base + noise).max(1.0)
    }
}

struct PlannedProbe {
    probe_id: ProbeId,
    server_delay: Duration,
    device_delay: Option<Duration>,
}

/// In-process stand-in for a messaging client.
///
/// Every probe gets a server acknowledgement and, unless it is lost, a
/// device acknowledgement after a delay drawn from the target's profile.
pub struct SimulatedTransport {
    acks: mpsc::UnboundedSender<AckEvent>,
    default_profile: DeviceProfile,
    devices: Mutex<HashMap<TargetId, (DeviceProfile, u64)>>,
}

impl SimulatedTransport {
    pub fn new(default_profile: DeviceProfile) -> (Self, mpsc::UnboundedReceiver<AckEvent>) {
        let (acks, receiver) = mpsc::unbounded_channel();
        (
            Self {
                acks,
                default_profile,
                devices: Mutex::new(HashMap::new()),
            },
            receiver,
        )
    }

    /// Override the profile of a single target.
    pub fn set_profile(&self, target: TargetId, profile: DeviceProfile) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(target, (profile, 0));
        }
    }

    fn plan(&self, target: &TargetId) -> Result<PlannedProbe> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| anyhow!("Simulated device table poisoned"))?;
        let (profile, probes_sent) = devices
            .entry(target.clone())
            .or_insert_with(|| (self.default_profile.clone(), 0));

        let mut rng = rand::thread_rng();
        let rtt_ms = profile.sample_rtt(*probes_sent, &mut rng);
        let lost = rng.gen_bool(profile.loss_rate.clamp(0.0, 1.0));
        *probes_sent += 1;

        Ok(PlannedProbe {
            probe_id: ProbeId::new(format!("3EB0{}", uuid::Uuid::new_v4().simple()).to_uppercase()),
            server_delay: Duration::from_secs_f64(profile.server_ack_delay_ms.min(rtt_ms) / 1000.0),
            device_delay: (!lost).then(|| Duration::from_secs_f64(rtt_ms / 1000.0)),
        })
    }
}

#[async_trait]
impl ProbeTransport for SimulatedTransport {
    async fn send_probe(&self, target: &TargetId) -> Result<ProbeId> {
        if self.acks.is_closed() {
            return Err(anyhow!("Acknowledgement receiver is gone"));
        }

        let planned = self.plan(target)?;
        trace!(
            "Simulated probe {} to {target}: device ack in {:?}",
            planned.probe_id,
            planned.device_delay
        );

        let acks = self.acks.clone();
        let remote = target.clone();
        let probe_id = planned.probe_id.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();

            tokio::time::sleep(planned.server_delay).await;
            let _ = acks.send(AckEvent {
                probe_id: probe_id.clone(),
                remote: remote.clone(),
                kind: AckKind::ServerReceived,
                received_at: tokio::time::Instant::now().into_std(),
            });

            let Some(device_delay) = planned.device_delay else {
                return;
            };
            tokio::time::sleep_until(start + device_delay).await;
            let _ = acks.send(AckEvent {
                probe_id,
                remote,
                kind: AckKind::DeviceReceived,
                received_at: tokio::time::Instant::now().into_std(),
            });
        });

        Ok(planned.probe_id)
    }
}
