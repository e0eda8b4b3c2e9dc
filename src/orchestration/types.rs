//! # Orchestration Types
//!
//! Values shared by the provisioning components and the region orchestrator:
//! the resolved account context, per-region derived identifiers, step results,
//! and the load stream record.

use crate::config::WarehouseConfig;
use crate::constants::{self, delivery};
use crate::providers::{ProviderError, ProviderErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the account every resource is created in. Resolved once per
/// run and passed by reference into every component call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    account_id: String,
    partition: String,
    caller_arn: Option<String>,
}

impl AccountContext {
    pub fn new(account_id: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            partition: partition.into(),
            caller_arn: None,
        }
    }

    pub fn with_caller_arn(mut self, caller_arn: impl Into<String>) -> Self {
        self.caller_arn = Some(caller_arn.into());
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn caller_arn(&self) -> Option<&str> {
        self.caller_arn.as_deref()
    }

    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:{}:iam::{}:role/{}", self.partition, self.account_id, role_name)
    }

    /// Streaming destination a delivery channel points at; streams are
    /// addressed without a region segment.
    pub fn streaming_destination_arn(&self, stream_name: &str) -> String {
        format!(
            "arn:{}:kinesis::{}:stream/{}",
            self.partition, self.account_id, stream_name
        )
    }

    pub fn delivery_stream_arn(&self, region: &str, stream_name: &str) -> String {
        format!(
            "arn:{}:firehose:{}:{}:deliverystream/{}",
            self.partition, region, self.account_id, stream_name
        )
    }

    pub fn bucket_arn(&self, bucket_name: &str) -> String {
        format!("arn:{}:s3:::{}", self.partition, bucket_name)
    }
}

/// Identifiers derived for one region, created per orchestrator iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub region: String,
    pub recorder_name: String,
    pub channel_name: String,
    pub recorder_role_arn: String,
    pub delivery_role_arn: String,
    pub streaming_destination_arn: String,
}

impl RegionDescriptor {
    pub fn derive(
        account: &AccountContext,
        region: &str,
        recorder_role_name: &str,
        delivery_role_name: &str,
        stream_name: &str,
    ) -> Self {
        Self {
            region: region.to_string(),
            recorder_name: constants::DEFAULT_RECORDER_NAME.to_string(),
            channel_name: constants::DEFAULT_CHANNEL_NAME.to_string(),
            recorder_role_arn: account.role_arn(recorder_role_name),
            delivery_role_arn: account.role_arn(delivery_role_name),
            streaming_destination_arn: account.streaming_destination_arn(stream_name),
        }
    }
}

/// Why a step did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or throttling; the caller may retry the whole run
    Transient,
    PermissionDenied,
    /// The provider rejected the request (invalid role, limits, missing bucket)
    InvalidRequest,
    NotFound,
    /// Local input rejected before any provider call
    ConfigurationInvalid,
    /// Not attempted because a step it depends on failed
    DependencyFailed,
    Unknown,
}

impl FailureKind {
    pub fn from_provider_kind(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Transient => Self::Transient,
            ProviderErrorKind::PermissionDenied => Self::PermissionDenied,
            ProviderErrorKind::InvalidRequest => Self::InvalidRequest,
            ProviderErrorKind::NotFound => Self::NotFound,
            // Already-exists is never a failure; reaching here means a wrapper
            // surfaced it where it could not be absorbed.
            ProviderErrorKind::AlreadyExists | ProviderErrorKind::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::ConfigurationInvalid => "configuration_invalid",
            Self::DependencyFailed => "dependency_failed",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Failure detail carried by [`ProvisioningStepResult::Failed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    /// Provider error code, when the failure came from a provider
    pub code: Option<String>,
    pub reason: String,
    pub remediation: Option<String>,
}

impl StepFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            reason: reason.into(),
            remediation: None,
        }
    }

    pub fn dependency_failed(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::DependencyFailed, reason)
    }

    pub fn from_provider(error: &ProviderError) -> Self {
        let classification = crate::providers::error_classifier::classify(error);
        Self {
            kind: FailureKind::from_provider_kind(error.kind),
            code: Some(error.code.clone()),
            reason: error.to_string(),
            remediation: classification.remediation,
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.reason)
    }
}

/// Outcome of one provisioning step. Every step yields exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "failure", rename_all = "snake_case")]
pub enum ProvisioningStepResult {
    Created,
    AlreadyExists,
    /// An existing definition was overwritten in place
    Replaced,
    Failed(StepFailure),
}

impl ProvisioningStepResult {
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed(StepFailure::new(kind, reason))
    }

    pub fn from_provider_error(error: &ProviderError) -> Self {
        Self::Failed(StepFailure::from_provider(error))
    }

    pub fn is_success(&self) -> bool {
        !self.is_failure()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already_exists",
            Self::Replaced => "replaced",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ProvisioningStepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(failure) => write!(f, "failed {failure}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Warehouse destination of the load stream. The password is only ever
/// handed to the stream provider; it is redacted from `Debug` and never
/// serialized.
#[derive(Clone)]
pub struct WarehouseTarget {
    pub jdbc_url: String,
    pub table_name: String,
    pub username: String,
    password: String,
}

impl WarehouseTarget {
    pub fn new(
        jdbc_url: impl Into<String>,
        table_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            jdbc_url: jdbc_url.into(),
            table_name: table_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn copy_options(&self) -> &'static str {
        delivery::COPY_OPTIONS
    }
}

impl From<&WarehouseConfig> for WarehouseTarget {
    fn from(config: &WarehouseConfig) -> Self {
        Self::new(
            config.jdbc_url.clone(),
            config.table_name.clone(),
            config.username.clone(),
            config.password.clone(),
        )
    }
}

impl fmt::Debug for WarehouseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseTarget")
            .field("jdbc_url", &self.jdbc_url)
            .field("table_name", &self.table_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Identifier of the provisioned load stream, kept for the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStreamRecord {
    pub stream_name: String,
    pub region: String,
    pub arn: String,
    /// `Created` or `AlreadyExists`
    pub outcome: ProvisioningStepResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_context_arns() {
        let account = AccountContext::new("123456789012", "aws");
        assert_eq!(
            account.role_arn("AWSConfigRole"),
            "arn:aws:iam::123456789012:role/AWSConfigRole"
        );
        assert_eq!(
            account.streaming_destination_arn("s1"),
            "arn:aws:kinesis::123456789012:stream/s1"
        );
        assert_eq!(
            account.delivery_stream_arn("us-west-2", "s1"),
            "arn:aws:firehose:us-west-2:123456789012:deliverystream/s1"
        );
        assert_eq!(account.bucket_arn("b1"), "arn:aws:s3:::b1");
    }

    #[test]
    fn test_region_descriptor_derivation() {
        let account = AccountContext::new("123456789012", "aws-us-gov");
        let descriptor = RegionDescriptor::derive(
            &account,
            "us-gov-west-1",
            "AWSConfigRole",
            "FirehoseDeliveryRole",
            "s1",
        );
        assert_eq!(descriptor.recorder_name, "default");
        assert_eq!(descriptor.channel_name, "default");
        assert_eq!(
            descriptor.delivery_role_arn,
            "arn:aws-us-gov:iam::123456789012:role/FirehoseDeliveryRole"
        );
    }

    #[test]
    fn test_step_result_serde_shape() {
        let json = serde_json::to_value(ProvisioningStepResult::Created).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "created"}));

        let failed = ProvisioningStepResult::failed(FailureKind::PermissionDenied, "denied");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["failure"]["kind"], "permission_denied");
        assert!(failed.is_failure());
        assert_eq!(failed.failure().unwrap().reason, "denied");
    }

    #[test]
    fn test_warehouse_target_redacts_password() {
        let target = WarehouseTarget::new("jdbc:redshift://h:5439/dev", "t", "u", "s3cret!");
        assert!(!format!("{target:?}").contains("s3cret!"));
        assert_eq!(target.password(), "s3cret!");
        assert_eq!(target.copy_options(), "JSON 'auto'");
    }
}
