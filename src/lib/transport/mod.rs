pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;

use crate::tracker::types::{ProbeId, TargetId};

/// The messaging client that actually emits probes.
///
/// A probe is an innocuous, non-persisting operation addressed to a fabricated
/// message id. Its acknowledgements are reported separately, as
/// [`AckEvent`](crate::tracker::types::AckEvent)s fed to the tracker.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn send_probe(&self, target: &TargetId) -> Result<ProbeId>;
}
