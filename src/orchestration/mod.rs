//! # Orchestration
//!
//! The region orchestrator and the values it hands between components.
//!
//! - **RegionOrchestrator**: runs identities, then every region (recorder
//!   before channel), then the load stream behind a join barrier
//! - **RunReport**: per-identity, per-region and stream outcomes of one run
//! - **types**: account context, region descriptors, step results

pub mod region_orchestrator;
pub mod report;
pub mod types;

pub use region_orchestrator::{provision_pipeline, RegionOrchestrator};
pub use report::{IdentityReport, RegionReport, RunReport, StreamReport};
pub use types::{
    AccountContext, DeliveryStreamRecord, FailureKind, ProvisioningStepResult, RegionDescriptor,
    StepFailure, WarehouseTarget,
};
