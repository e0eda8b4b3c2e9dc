//! # Pipeline Error Types
//!
//! Crate-level error type. Component-specific errors (configuration loading,
//! provider calls, state transitions) convert into [`PipelineError`] so callers
//! can use a single `Result` alias.

use crate::config::ConfigurationError;
use crate::providers::ProviderError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(#[from] ConfigurationError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Identity provisioning failed for role {role_name}: {reason}")]
    IdentityProvisioning { role_name: String, reason: String },

    #[error("Delivery stream provisioning failed for {stream_name}: {reason}")]
    StreamProvisioning { stream_name: String, reason: String },

    #[error("Run {run_id} was cancelled after {completed_regions} region(s)")]
    Cancelled {
        run_id: String,
        completed_regions: usize,
    },

    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn identity_provisioning(role_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IdentityProvisioning {
            role_name: role_name.into(),
            reason: reason.into(),
        }
    }

    pub fn stream_provisioning(stream_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StreamProvisioning {
            stream_name: stream_name.into(),
            reason: reason.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
