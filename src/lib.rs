#![allow(clippy::doc_markdown)] // Allow technical terms like JDBC, ARN in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Recorder Pipeline
//!
//! Provisions a cross-region configuration-recording pipeline: a recorder in
//! every target region, each bound to a streaming delivery channel, all
//! feeding one managed load stream that copies change events into a
//! warehouse table.
//!
//! ## Architecture
//!
//! Provisioning is a sequence of idempotent, dependency-ordered steps driven
//! by an explicit run state machine:
//!
//! ```text
//! Init -> ProvisioningIdentities -> ProvisioningRegions(i) -> ProvisioningStream -> Done
//!   |              |                        |                       |
//!   v              v                        v                       v
//! Aborted        Aborted                Cancelled                 Failed
//! ```
//!
//! Every step yields exactly one [`ProvisioningStepResult`]. "Already exists"
//! is the steady state on re-runs, never a failure. A failing region is
//! recorded and its siblings carry on. The load stream is declared once,
//! after every region has reported, in the first configured region.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`providers`] - Service traits, error classification, in-memory and AWS backends
//! - [`provisioning`] - Identity, recorder, channel and stream components
//! - [`orchestration`] - Region orchestrator and the run report
//! - [`state_machine`] - Run states, events and transitions
//! - [`logging`] - Structured console and JSON file logging
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust
//! use recorder_pipeline::config::{PipelineConfiguration, WarehouseConfig};
//! use recorder_pipeline::providers::{InMemoryCloud, ProviderSet};
//! use recorder_pipeline::{provision_pipeline, RunState};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = PipelineConfiguration::new(
//!     vec!["us-west-2".to_string(), "us-east-1".to_string()],
//!     "config-snapshots",
//!     "config-stream",
//!     WarehouseConfig::new("jdbc:redshift://example:5439/dev", "resources", "loader", "secret"),
//! );
//! let cloud = Arc::new(InMemoryCloud::new("123456789012"));
//!
//! let report = provision_pipeline(&config, ProviderSet::from_backend(cloud)).await;
//! assert_eq!(report.final_state, RunState::Done);
//! assert_eq!(report.regions.len(), 2);
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod orchestration;
pub mod providers;
pub mod provisioning;
pub mod state_machine;

pub use crate::config::{
    ConfigManager, ExecutionConfig, IdentitiesConfig, PipelineConfiguration, ProvisionerConfig,
    RoleConfig, WarehouseConfig,
};
pub use error::{PipelineError, Result};
pub use orchestration::{
    provision_pipeline, AccountContext, FailureKind, ProvisioningStepResult, RegionOrchestrator,
    RegionReport, RunReport, StepFailure,
};
pub use providers::{ProviderError, ProviderErrorKind, ProviderSet};
pub use state_machine::{RunEvent, RunState, RunStateMachine};
