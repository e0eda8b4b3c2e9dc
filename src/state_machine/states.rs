use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "completed_regions", rename_all = "snake_case")]
pub enum RunState {
    /// Configuration and account context are being resolved
    Init,
    /// Recorder and delivery roles are being ensured
    ProvisioningIdentities,
    /// Region steps are running; the value counts regions already finalized
    ProvisioningRegions(usize),
    /// Every region has returned; the load stream is being declared
    ProvisioningStream,
    /// The load stream exists
    Done,
    /// The load stream could not be provisioned
    Failed,
    /// Stopped before any region work (invalid input or identity failure)
    Aborted,
    /// Stopped between regions by an external signal
    Cancelled,
}

impl RunState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed | Self::Aborted | Self::Cancelled
        )
    }

    /// Check if the run finished with its terminal resource in place
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if region-level work is underway
    pub fn is_provisioning_regions(&self) -> bool {
        matches!(self, Self::ProvisioningRegions(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::ProvisioningIdentities => write!(f, "provisioning_identities"),
            Self::ProvisioningRegions(i) => write!(f, "provisioning_regions({i})"),
            Self::ProvisioningStream => write!(f, "provisioning_stream"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "provisioning_identities" => Ok(Self::ProvisioningIdentities),
            "provisioning_stream" => Ok(Self::ProvisioningStream),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            "cancelled" => Ok(Self::Cancelled),
            other => other
                .strip_prefix("provisioning_regions(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.parse().ok())
                .map(Self::ProvisioningRegions)
                .ok_or_else(|| format!("Invalid run state: {s}")),
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::Init
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Aborted.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(!RunState::Init.is_terminal());
        assert!(!RunState::ProvisioningRegions(3).is_terminal());
        assert!(!RunState::ProvisioningStream.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(RunState::ProvisioningRegions(2).to_string(), "provisioning_regions(2)");
        assert_eq!(
            "provisioning_regions(2)".parse::<RunState>().unwrap(),
            RunState::ProvisioningRegions(2)
        );
        assert_eq!("done".parse::<RunState>().unwrap(), RunState::Done);
        assert!("provisioning_regions(x)".parse::<RunState>().is_err());
        assert!("bogus".parse::<RunState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&RunState::ProvisioningRegions(1)).unwrap();
        assert_eq!(json, r#"{"state":"provisioning_regions","completed_regions":1}"#);

        let json = serde_json::to_string(&RunState::Done).unwrap();
        assert_eq!(json, r#"{"state":"done"}"#);
    }
}
