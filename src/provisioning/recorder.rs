//! # Recorder Activator
//!
//! Declares the full-coverage configuration recorder in one region and starts
//! it. The declaration is repeated per region; each region scopes its own
//! recorder, so repeating it is safe.

use crate::constants::{events, DEFAULT_RECORDER_NAME};
use crate::logging::{log_error, log_step_operation};
use crate::orchestration::types::{AccountContext, ProvisioningStepResult};
use crate::providers::{RecorderDefinition, RecorderService};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct RecorderActivator {
    recorders: Arc<dyn RecorderService>,
    recorder_name: String,
}

impl RecorderActivator {
    pub fn new(recorders: Arc<dyn RecorderService>) -> Self {
        Self {
            recorders,
            recorder_name: DEFAULT_RECORDER_NAME.to_string(),
        }
    }

    pub fn recorder_name(&self) -> &str {
        &self.recorder_name
    }

    /// Declare and start the recorder in `region`.
    ///
    /// Returns `AlreadyExists` when an identical definition was already
    /// declared, `Replaced` when a recorder of the same name was redeclared
    /// with a different definition, and `Created` otherwise. Starting an
    /// already-running recorder is not an error.
    #[instrument(skip(self, account), fields(account_id = %account.account_id()))]
    pub async fn activate(
        &self,
        account: &AccountContext,
        region: &str,
        role_arn: &str,
    ) -> ProvisioningStepResult {
        let result = self.declare_and_start(region, role_arn).await;

        log_step_operation(
            events::RECORDER_ACTIVATED,
            Some(region),
            &self.recorder_name,
            result.label(),
            Some(role_arn),
        );
        if let Some(failure) = result.failure() {
            log_error("recorder_activator", "activate", &failure.to_string(), Some(region));
        }
        result
    }

    async fn declare_and_start(&self, region: &str, role_arn: &str) -> ProvisioningStepResult {
        let definition = RecorderDefinition::full_coverage(&self.recorder_name, role_arn);

        let existing = match self
            .recorders
            .describe_recorder(region, &self.recorder_name)
            .await
        {
            Ok(existing) => existing,
            Err(err) => return ProvisioningStepResult::from_provider_error(&err),
        };

        let outcome = match existing {
            Some(status) if status.definition == definition => {
                debug!(region = %region, recording = status.recording, "Recorder already declared");
                ProvisioningStepResult::AlreadyExists
            }
            Some(_) => ProvisioningStepResult::Replaced,
            None => ProvisioningStepResult::Created,
        };

        if outcome != ProvisioningStepResult::AlreadyExists {
            if let Err(err) = self.recorders.put_recorder(region, &definition).await {
                return ProvisioningStepResult::from_provider_error(&err);
            }
        }

        match self
            .recorders
            .start_recorder(region, &self.recorder_name)
            .await
        {
            Ok(()) => outcome,
            Err(err) => ProvisioningStepResult::from_provider_error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::FailureKind;
    use crate::providers::memory::Operation;
    use crate::providers::{IdentityService, InMemoryCloud};

    const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/AWSConfigRole";

    async fn setup() -> (Arc<InMemoryCloud>, RecorderActivator, AccountContext) {
        let cloud = Arc::new(InMemoryCloud::new("123456789012"));
        cloud.create_role("AWSConfigRole", "{}").await.unwrap();
        let activator = RecorderActivator::new(cloud.clone());
        (cloud, activator, AccountContext::new("123456789012", "aws"))
    }

    #[tokio::test]
    async fn test_activate_declares_full_coverage_and_starts() {
        let (cloud, activator, account) = setup().await;

        let result = activator.activate(&account, "us-west-2", ROLE_ARN).await;
        assert_eq!(result, ProvisioningStepResult::Created);

        let status = cloud.recorder("us-west-2").unwrap();
        assert!(status.recording);
        assert!(status.definition.all_supported);
        assert!(status.definition.include_global_resource_types);
        assert_eq!(status.definition.name, "default");
    }

    #[tokio::test]
    async fn test_reactivation_is_already_exists() {
        let (cloud, activator, account) = setup().await;
        activator.activate(&account, "us-west-2", ROLE_ARN).await;

        let result = activator.activate(&account, "us-west-2", ROLE_ARN).await;
        assert_eq!(result, ProvisioningStepResult::AlreadyExists);
        assert_eq!(cloud.calls_for(Operation::PutRecorder).len(), 1);
        assert_eq!(cloud.calls_for(Operation::StartRecorder).len(), 2);
    }

    #[tokio::test]
    async fn test_changed_role_replaces_definition() {
        let (cloud, activator, account) = setup().await;
        cloud.create_role("OtherRole", "{}").await.unwrap();
        activator.activate(&account, "us-west-2", ROLE_ARN).await;

        let other = "arn:aws:iam::123456789012:role/OtherRole";
        let result = activator.activate(&account, "us-west-2", other).await;
        assert_eq!(result, ProvisioningStepResult::Replaced);
        assert_eq!(cloud.recorder("us-west-2").unwrap().definition.role_arn, other);
    }

    #[tokio::test]
    async fn test_unknown_role_is_invalid_request() {
        let (_cloud, activator, account) = setup().await;
        let result = activator
            .activate(&account, "us-west-2", "arn:aws:iam::123456789012:role/Missing")
            .await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidRequest);
        assert!(failure.remediation.is_some());
    }

    #[tokio::test]
    async fn test_start_failure_surfaces() {
        let (cloud, activator, account) = setup().await;
        cloud.fail(
            Operation::StartRecorder,
            Some("us-east-1"),
            "AccessDeniedException",
            "denied",
        );
        let result = activator.activate(&account, "us-east-1", ROLE_ARN).await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::PermissionDenied);
    }
}
