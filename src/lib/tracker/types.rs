use serde::{Deserialize, Serialize};

/// Identifier of a tracked remote device (a JID or equivalent address).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of an outbound probe, i.e. the fabricated message id it addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ProbeId(String);

impl ProbeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A probe id that never left this process, used when sending failed.
    pub fn local() -> Self {
        Self(format!("local-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProbeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ActivityState {
    Online,
    Standby,
    Offline,
    Calibrating,
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Standby => write!(f, "Standby"),
            Self::Offline => write!(f, "Offline"),
            Self::Calibrating => write!(f, "Calibrating"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum NetworkType {
    #[serde(rename = "Wi-Fi")]
    WiFi,
    #[serde(rename = "LTE")]
    Lte,
    Unknown,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WiFi => write!(f, "Wi-Fi"),
            Self::Lte => write!(f, "LTE"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Acknowledgement kinds reported by the messaging client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckKind {
    /// The server accepted the probe. Says nothing about the device.
    ServerReceived,
    /// The remote device itself acknowledged the probe.
    DeviceReceived,
}

/// An acknowledgement as delivered by the messaging client.
#[derive(Clone, Debug)]
pub struct AckEvent {
    pub probe_id: ProbeId,
    pub remote: TargetId,
    pub kind: AckKind,
    pub received_at: std::time::Instant,
}

/// Confirmation status of one classification axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AxisConfirmation {
    pub pending: bool,
    /// 0..=100, the lesser of window-count progress and elapsed-time progress.
    pub progress: u8,
}

/// What triggered a classification.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateCause {
    Sample { rtt_ms: f64 },
    Timeout { waited_ms: f64 },
}

/// Output of the classifier for one event.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Classification {
    pub cause: UpdateCause,
    pub activity: ActivityState,
    pub network: NetworkType,
    pub raw_activity: ActivityState,
    pub raw_network: NetworkType,
    pub median_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub magnitude_threshold_ms: f64,
    pub jitter_threshold_ms: f64,
    pub confidence: ConfidenceLevel,
    pub transitions: u64,
    pub activity_confirmation: AxisConfirmation,
    pub network_confirmation: AxisConfirmation,
    pub consecutive_timeouts: u32,
}

/// A classification published for a tracked target.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClassificationUpdate {
    pub target: TargetId,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub classification: Classification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_type_uses_display_names_on_the_wire() {
        assert_eq!(serde_json::to_string(&NetworkType::WiFi).unwrap(), "\"Wi-Fi\"");
        assert_eq!(serde_json::to_string(&NetworkType::Lte).unwrap(), "\"LTE\"");
        assert_eq!(NetworkType::WiFi.to_string(), "Wi-Fi");
    }

    #[test]
    fn confidence_levels_are_ordered() {
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
    }

    #[test]
    fn local_probe_ids_are_unique() {
        let first = ProbeId::local();
        let second = ProbeId::local();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("local-"));
    }
}
