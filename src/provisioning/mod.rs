//! # Provisioning Components
//!
//! The four leaf components the region orchestrator drives. Each takes the
//! resolved [`AccountContext`](crate::orchestration::types::AccountContext)
//! explicitly, talks to exactly one provider service, and returns exactly one
//! [`ProvisioningStepResult`](crate::orchestration::types::ProvisioningStepResult)
//! per call. None of them retries.

pub mod channel;
pub mod identity;
pub mod recorder;
pub mod stream;

pub use channel::DeliveryChannelBinder;
pub use identity::{IdentityProvisioner, TrustPolicy};
pub use recorder::RecorderActivator;
pub use stream::StreamProvisioner;
