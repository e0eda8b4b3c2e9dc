//! # Identity Provisioner
//!
//! Ensures the trust roles the recorder and the load stream assume. A role
//! that already exists is the steady state on re-runs and is reported as
//! `AlreadyExists`. The managed policy is attached on every run, so a role
//! whose attach step failed earlier is repaired by the next run.

use crate::config::{validate_role_name, RoleConfig};
use crate::constants::{events, identity};
use crate::logging::{log_error, log_step_operation};
use crate::orchestration::types::{AccountContext, FailureKind, ProvisioningStepResult};
use crate::providers::IdentityService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A trust policy naming exactly one trusted service principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    service_principal: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument {
    version: String,
    statement: Vec<PolicyStatement>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyStatement {
    effect: String,
    principal: ServicePrincipal,
    action: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServicePrincipal {
    service: String,
}

impl TrustPolicy {
    pub fn for_service(service_principal: impl Into<String>) -> Self {
        Self {
            service_principal: service_principal.into(),
        }
    }

    pub fn service_principal(&self) -> &str {
        &self.service_principal
    }

    /// Render the provider's JSON policy document
    pub fn to_document(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&PolicyDocument {
            version: identity::TRUST_POLICY_VERSION.to_string(),
            statement: vec![PolicyStatement {
                effect: "Allow".to_string(),
                principal: ServicePrincipal {
                    service: self.service_principal.clone(),
                },
                action: identity::ASSUME_ROLE_ACTION.to_string(),
            }],
        })
    }
}

/// Creates trust roles and attaches their managed policies
#[derive(Clone)]
pub struct IdentityProvisioner {
    identity: Arc<dyn IdentityService>,
}

impl IdentityProvisioner {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }

    /// Ensure one role from its configuration
    pub async fn ensure(&self, account: &AccountContext, role: &RoleConfig) -> ProvisioningStepResult {
        self.ensure_role(
            account,
            &role.role_name,
            &TrustPolicy::for_service(&role.service_principal),
            &role.managed_policy_arn,
        )
        .await
    }

    #[instrument(skip(self, account, trust_policy), fields(account_id = %account.account_id()))]
    pub async fn ensure_role(
        &self,
        account: &AccountContext,
        role_name: &str,
        trust_policy: &TrustPolicy,
        managed_policy_arn: &str,
    ) -> ProvisioningStepResult {
        let result = self
            .create_and_attach(role_name, trust_policy, managed_policy_arn)
            .await;

        let details = account.role_arn(role_name);
        log_step_operation(
            events::IDENTITY_ENSURED,
            None,
            role_name,
            result.label(),
            Some(&details),
        );
        if let Some(failure) = result.failure() {
            log_error("identity_provisioner", "ensure_role", &failure.to_string(), Some(role_name));
        }
        result
    }

    async fn create_and_attach(
        &self,
        role_name: &str,
        trust_policy: &TrustPolicy,
        managed_policy_arn: &str,
    ) -> ProvisioningStepResult {
        if let Err(err) = validate_role_name(role_name, "identity provisioner") {
            return ProvisioningStepResult::failed(FailureKind::ConfigurationInvalid, err.to_string());
        }

        let document = match trust_policy.to_document() {
            Ok(document) => document,
            Err(err) => {
                return ProvisioningStepResult::failed(
                    FailureKind::ConfigurationInvalid,
                    format!("trust policy could not be rendered: {err}"),
                )
            }
        };

        let created = match self.identity.create_role(role_name, &document).await {
            Ok(()) => ProvisioningStepResult::Created,
            Err(err) if err.is_already_exists() => {
                debug!(role_name = %role_name, "Role already exists, re-attaching managed policy");
                ProvisioningStepResult::AlreadyExists
            }
            Err(err) => return ProvisioningStepResult::from_provider_error(&err),
        };

        // Attaching an already attached policy is a no-op on the provider.
        match self
            .identity
            .attach_role_policy(role_name, managed_policy_arn)
            .await
        {
            Ok(()) => created,
            Err(err) => ProvisioningStepResult::from_provider_error(&err),
        }
    }
}
