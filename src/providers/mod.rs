//! # Provider Boundary
//!
//! Async traits for the external services the pipeline depends on, plus the
//! closed [`ProviderErrorKind`] taxonomy every backend maps its error codes
//! into. Components only ever see these traits, so the same orchestration
//! code runs against the cloud SDK backend or the in-memory backend.

pub mod error_classifier;
pub mod memory;

#[cfg(feature = "aws")]
pub mod aws;

use crate::orchestration::types::AccountContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use error_classifier::{classify, classify_error_code, ErrorClassification};
pub use memory::InMemoryCloud;

/// Closed set of provider failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The resource is already there; benign on re-runs
    AlreadyExists,
    /// Network, throttling, or service availability problems
    Transient,
    PermissionDenied,
    /// The request itself was rejected (bad role, limits, bad parameters)
    InvalidRequest,
    NotFound,
    Unknown,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AlreadyExists => "already_exists",
            Self::Transient => "transient",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// An error returned by a provider call, classified at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed ({code}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub code: String,
    pub message: String,
    pub operation: String,
}

impl ProviderError {
    /// Build an error from a provider error code, classifying it once
    pub fn from_code(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let code = code.into();
        Self {
            kind: classify_error_code(&code),
            code,
            message: message.into(),
            operation: operation.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ProviderErrorKind::AlreadyExists
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A configuration recorder as declared in one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderDefinition {
    pub name: String,
    pub role_arn: String,
    pub all_supported: bool,
    pub include_global_resource_types: bool,
}

impl RecorderDefinition {
    /// Full-coverage recording: every supported type, global types included
    pub fn full_coverage(name: impl Into<String>, role_arn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role_arn: role_arn.into(),
            all_supported: true,
            include_global_resource_types: true,
        }
    }
}

/// Recorder state reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderStatus {
    pub definition: RecorderDefinition,
    pub recording: bool,
}

/// A delivery channel routing recorder output to storage and a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryChannelDefinition {
    pub name: String,
    pub s3_bucket_name: String,
    pub streaming_destination_arn: String,
    pub snapshot_delivery_frequency: String,
}

/// Copy instructions for the warehouse load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCommand {
    pub table_name: String,
    pub columns: Vec<String>,
    pub copy_options: String,
}

/// Intermediate storage the load stream stages batches in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingConfiguration {
    pub role_arn: String,
    pub bucket_arn: String,
    pub prefix: String,
    pub buffering_interval_seconds: i32,
    pub buffering_size_mib: i32,
    pub compression: String,
}

/// Direct-put delivery stream with a warehouse destination
#[derive(Clone, PartialEq, Eq)]
pub struct DeliveryStreamDefinition {
    pub name: String,
    pub role_arn: String,
    pub jdbc_url: String,
    pub copy_command: CopyCommand,
    pub username: String,
    pub password: String,
    pub staging: StagingConfiguration,
}

impl fmt::Debug for DeliveryStreamDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryStreamDefinition")
            .field("name", &self.name)
            .field("role_arn", &self.role_arn)
            .field("jdbc_url", &self.jdbc_url)
            .field("copy_command", &self.copy_command)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("staging", &self.staging)
            .finish()
    }
}

/// Resolves the account the default credentials belong to
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve_account(&self) -> ProviderResult<AccountContext>;
}

/// Identity role management
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_role(&self, role_name: &str, trust_policy_document: &str)
        -> ProviderResult<()>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()>;
}

/// Configuration recorder management, scoped per region
#[async_trait]
pub trait RecorderService: Send + Sync {
    async fn describe_recorder(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<RecorderStatus>>;

    async fn put_recorder(&self, region: &str, recorder: &RecorderDefinition)
        -> ProviderResult<()>;

    /// Starting a recorder that is already running succeeds
    async fn start_recorder(&self, region: &str, name: &str) -> ProviderResult<()>;
}

/// Delivery channel management, scoped per region. `put_channel` replaces.
#[async_trait]
pub trait DeliveryChannelService: Send + Sync {
    async fn describe_channel(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<DeliveryChannelDefinition>>;

    async fn put_channel(
        &self,
        region: &str,
        channel: &DeliveryChannelDefinition,
    ) -> ProviderResult<()>;
}

/// Managed delivery stream management
#[async_trait]
pub trait DeliveryStreamService: Send + Sync {
    /// Returns the ARN of the new stream
    async fn create_delivery_stream(
        &self,
        region: &str,
        stream: &DeliveryStreamDefinition,
    ) -> ProviderResult<String>;

    /// Returns the ARN of an existing stream
    async fn describe_delivery_stream(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<String>>;
}

/// The full set of services one run talks to. Owns the session/credentials
/// implicitly through the backend; nothing here is process-global.
#[derive(Clone)]
pub struct ProviderSet {
    pub account: Arc<dyn AccountResolver>,
    pub identity: Arc<dyn IdentityService>,
    pub recorders: Arc<dyn RecorderService>,
    pub channels: Arc<dyn DeliveryChannelService>,
    pub streams: Arc<dyn DeliveryStreamService>,
}

impl ProviderSet {
    /// Use one backend for every service
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AccountResolver
            + IdentityService
            + RecorderService
            + DeliveryChannelService
            + DeliveryStreamService
            + 'static,
    {
        Self {
            account: backend.clone(),
            identity: backend.clone(),
            recorders: backend.clone(),
            channels: backend.clone(),
            streams: backend,
        }
    }

    pub fn with_recorders(mut self, recorders: Arc<dyn RecorderService>) -> Self {
        self.recorders = recorders;
        self
    }

    pub fn with_channels(mut self, channels: Arc<dyn DeliveryChannelService>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_streams(mut self, streams: Arc<dyn DeliveryStreamService>) -> Self {
        self.streams = streams;
        self
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classified_on_construction() {
        let err = ProviderError::from_code("CreateRole", "EntityAlreadyExists", "exists");
        assert!(err.is_already_exists());
        assert_eq!(err.to_string(), "CreateRole failed (EntityAlreadyExists): exists");

        let err = ProviderError::from_code("PutRecorder", "ThrottlingException", "slow down");
        assert!(err.is_transient());
    }

    #[test]
    fn test_stream_definition_debug_redacts_password() {
        let definition = DeliveryStreamDefinition {
            name: "s1".into(),
            role_arn: "arn:aws:iam::1:role/r".into(),
            jdbc_url: "jdbc:redshift://h:5439/dev".into(),
            copy_command: CopyCommand {
                table_name: "t".into(),
                columns: vec![],
                copy_options: "JSON 'auto'".into(),
            },
            username: "u".into(),
            password: "topsecret".into(),
            staging: StagingConfiguration {
                role_arn: "arn:aws:iam::1:role/r".into(),
                bucket_arn: "arn:aws:s3:::b".into(),
                prefix: "firehose/".into(),
                buffering_interval_seconds: 300,
                buffering_size_mib: 5,
                compression: "UNCOMPRESSED".into(),
            },
        };
        assert!(!format!("{definition:?}").contains("topsecret"));
    }
}
