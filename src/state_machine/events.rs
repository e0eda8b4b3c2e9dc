use serde::{Deserialize, Serialize};

/// Events that drive a provisioning run between states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    /// Configuration validated and account context resolved
    Start,
    /// Stop before any region work, with the reason
    Abort(String),
    /// Both identity roles returned a non-failure result
    IdentitiesReady,
    /// One region returned its recorder and channel results
    RegionFinished(String),
    /// External cancellation observed between regions
    Cancel,
    /// The load stream returned its identifier
    StreamProvisioned(String),
    /// The load stream could not be provisioned
    StreamFailed(String),
}

impl RunEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Abort(_) => "abort",
            Self::IdentitiesReady => "identities_ready",
            Self::RegionFinished(_) => "region_finished",
            Self::Cancel => "cancel",
            Self::StreamProvisioned(_) => "stream_provisioned",
            Self::StreamFailed(_) => "stream_failed",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Abort(msg) | Self::StreamFailed(msg) => Some(msg),
            _ => None,
        }
    }
}
