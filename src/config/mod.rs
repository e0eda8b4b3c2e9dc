//! # Pipeline Configuration System
//!
//! YAML-based configuration with environment-specific overrides, mirroring the
//! layout used by every other deployment surface of the pipeline.
//!
//! ## Architecture
//!
//! - **Single Source of Truth**: Configuration comes from `pipeline-config.yaml`
//! - **Environment Awareness**: `development`/`test`/`production` sections are
//!   merged over the base document
//! - **Variable Overrides**: `PROVISIONER__<SECTION>__<KEY>` environment
//!   variables are layered on top through the `config` crate
//! - **Explicit Validation**: Invalid input is rejected before any provider call
//!
//! ## Usage
//!
//! ```rust,no_run
//! use recorder_pipeline::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let pipeline = &manager.config().pipeline;
//! println!("home region: {:?}", pipeline.home_region());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::identity;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring pipeline-config.yaml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisionerConfig {
    /// What to provision
    pub pipeline: PipelineConfiguration,

    /// Identity roles assumed by the recorder and the load stream
    #[serde(default)]
    pub identities: IdentitiesConfig,

    /// How the orchestrator schedules region work
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl ProvisionerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.pipeline.validate()?;
        self.identities.validate()?;
        self.execution.validate()
    }
}

/// Caller-supplied description of the pipeline, immutable for a run
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PipelineConfiguration {
    /// Target regions; index 0 is the home region of the load stream
    pub regions: Vec<String>,
    /// Snapshot delivery bucket, also used as staging for the load stream
    pub bucket_name: String,
    /// Name of the streaming destination and of the load stream
    pub stream_name: String,
    /// Warehouse the load stream copies into
    pub warehouse: WarehouseConfig,
}

impl PipelineConfiguration {
    pub fn new(
        regions: Vec<String>,
        bucket_name: impl Into<String>,
        stream_name: impl Into<String>,
        warehouse: WarehouseConfig,
    ) -> Self {
        Self {
            regions,
            bucket_name: bucket_name.into(),
            stream_name: stream_name.into(),
            warehouse,
        }
    }

    /// The region hosting the shared load stream
    pub fn home_region(&self) -> Option<&str> {
        self.regions.first().map(String::as_str)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.regions.is_empty() {
            return Err(ConfigurationError::missing_field(
                "regions",
                "pipeline (at least one region is required)",
            ));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            validate_region_code(region)?;
            if !seen.insert(region.as_str()) {
                return Err(ConfigurationError::invalid_field(
                    "regions",
                    region.clone(),
                    "region listed more than once",
                ));
            }
        }

        validate_bucket_name(&self.bucket_name)?;
        validate_stream_name(&self.stream_name)?;
        self.warehouse.validate()
    }
}

/// Warehouse connection parameters for the load stream destination
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WarehouseConfig {
    /// JDBC-style cluster URL, e.g. `jdbc:redshift://host:5439/dev`
    pub jdbc_url: String,
    pub table_name: String,
    pub username: String,
    #[serde(serialize_with = "serialize_redacted")]
    pub password: String,
}

impl WarehouseConfig {
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

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.jdbc_url.starts_with("jdbc:") {
            return Err(ConfigurationError::invalid_field(
                "warehouse.jdbc_url",
                self.jdbc_url.clone(),
                "must be a JDBC URL starting with 'jdbc:'",
            ));
        }
        if self.table_name.trim().is_empty() {
            return Err(ConfigurationError::missing_field(
                "table_name",
                "warehouse",
            ));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigurationError::missing_field(
                "username",
                "warehouse",
            ));
        }
        if self.password.is_empty() {
            return Err(ConfigurationError::missing_field(
                "password",
                "warehouse",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("jdbc_url", &self.jdbc_url)
            .field("table_name", &self.table_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn serialize_redacted<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_empty() {
        serializer.serialize_str("[EMPTY]")
    } else {
        serializer.serialize_str("[REDACTED]")
    }
}

/// Identity roles created once per account
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdentitiesConfig {
    #[serde(default = "RoleConfig::recorder_default")]
    pub recorder_role: RoleConfig,
    #[serde(default = "RoleConfig::delivery_default")]
    pub delivery_role: RoleConfig,
}

impl Default for IdentitiesConfig {
    fn default() -> Self {
        Self {
            recorder_role: RoleConfig::recorder_default(),
            delivery_role: RoleConfig::delivery_default(),
        }
    }
}

impl IdentitiesConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.recorder_role.validate("identities.recorder_role")?;
        self.delivery_role.validate("identities.delivery_role")?;
        if self.recorder_role.role_name == self.delivery_role.role_name {
            return Err(ConfigurationError::invalid_field(
                "identities.delivery_role.role_name",
                self.delivery_role.role_name.clone(),
                "recorder and delivery roles must be distinct",
            ));
        }
        Ok(())
    }
}

/// A single trust role: its name, trusted service, and attached managed policy
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoleConfig {
    pub role_name: String,
    pub service_principal: String,
    pub managed_policy_arn: String,
}

impl RoleConfig {
    pub fn recorder_default() -> Self {
        Self {
            role_name: identity::RECORDER_ROLE_NAME.to_string(),
            service_principal: identity::RECORDER_SERVICE_PRINCIPAL.to_string(),
            managed_policy_arn: identity::RECORDER_MANAGED_POLICY_ARN.to_string(),
        }
    }

    pub fn delivery_default() -> Self {
        Self {
            role_name: identity::DELIVERY_ROLE_NAME.to_string(),
            service_principal: identity::DELIVERY_SERVICE_PRINCIPAL.to_string(),
            managed_policy_arn: identity::DELIVERY_MANAGED_POLICY_ARN.to_string(),
        }
    }

    fn validate(&self, context: &str) -> ConfigResult<()> {
        validate_role_name(&self.role_name, context)?;
        if self.service_principal.trim().is_empty() {
            return Err(ConfigurationError::missing_field(
                "service_principal",
                context,
            ));
        }
        if !self.managed_policy_arn.starts_with("arn:") {
            return Err(ConfigurationError::invalid_field(
                format!("{context}.managed_policy_arn"),
                self.managed_policy_arn.clone(),
                "must be an ARN",
            ));
        }
        Ok(())
    }
}

/// Region scheduling settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Regions provisioned concurrently; 1 keeps the run strictly sequential
    #[serde(default = "ExecutionConfig::default_max_concurrent_regions")]
    pub max_concurrent_regions: usize,
}

impl ExecutionConfig {
    fn default_max_concurrent_regions() -> usize {
        1
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_regions == 0 {
            return Err(ConfigurationError::invalid_field(
                "execution.max_concurrent_regions",
                "0",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_regions: Self::default_max_concurrent_regions(),
        }
    }
}

/// Region codes look like `us-west-2` or `us-gov-west-1`
pub fn validate_region_code(region: &str) -> ConfigResult<()> {
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts[0].len() == 2
        && parts[0].chars().all(|c| c.is_ascii_lowercase())
        && parts[1..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts
            .last()
            .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    if well_formed {
        Ok(())
    } else {
        Err(ConfigurationError::invalid_field(
            "regions",
            region,
            "expected a region code such as 'us-west-2'",
        ))
    }
}

/// Only emptiness and whitespace are rejected here; naming rules belong to
/// the storage provider and surface as a failed channel bind.
pub fn validate_bucket_name(bucket: &str) -> ConfigResult<()> {
    if bucket.is_empty() || bucket.chars().any(char::is_whitespace) {
        Err(ConfigurationError::invalid_field(
            "bucket_name",
            bucket,
            "must be non-empty and contain no whitespace",
        ))
    } else {
        Ok(())
    }
}

pub fn validate_stream_name(stream: &str) -> ConfigResult<()> {
    let valid_chars = stream
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');

    if (1..=64).contains(&stream.len()) && valid_chars {
        Ok(())
    } else {
        Err(ConfigurationError::invalid_field(
            "stream_name",
            stream,
            "1-64 characters from [A-Za-z0-9_.-]",
        ))
    }
}

pub fn validate_role_name(role_name: &str, context: &str) -> ConfigResult<()> {
    let valid_chars = role_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c));

    if (1..=identity::MAX_ROLE_NAME_LENGTH).contains(&role_name.len()) && valid_chars {
        Ok(())
    } else {
        Err(ConfigurationError::invalid_field(
            format!("{context}.role_name"),
            role_name,
            "1-64 characters from [A-Za-z0-9+=,.@_-]",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> PipelineConfiguration {
        PipelineConfiguration::new(
            vec!["us-west-2".to_string(), "us-east-1".to_string()],
            "b1",
            "s1",
            WarehouseConfig::new(
                "jdbc:redshift://cluster.example.com:5439/dev",
                "aws_config_resources",
                "loader",
                "hunter22",
            ),
        )
    }

    #[test]
    fn test_valid_pipeline_passes() {
        assert!(pipeline().validate().is_ok());
        assert_eq!(pipeline().home_region(), Some("us-west-2"));
    }

    #[test]
    fn test_empty_region_list_rejected() {
        let mut config = pipeline();
        config.regions.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingField { .. })
        ));
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let mut config = pipeline();
        config.regions.push("us-west-2".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_region_code_shapes() {
        assert!(validate_region_code("us-west-2").is_ok());
        assert!(validate_region_code("us-gov-west-1").is_ok());
        assert!(validate_region_code("ap-southeast-1").is_ok());
        assert!(validate_region_code("uswest2").is_err());
        assert!(validate_region_code("US-WEST-2").is_err());
        assert!(validate_region_code("us-west-").is_err());
        assert!(validate_region_code("").is_err());
    }

    #[test]
    fn test_bucket_and_stream_names() {
        assert!(validate_bucket_name("my.config-bucket1").is_ok());
        assert!(validate_bucket_name("b1").is_ok());
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("has space").is_err());

        assert!(validate_stream_name("config_stream.v1-a").is_ok());
        assert!(validate_stream_name("").is_err());
        assert!(validate_stream_name("has space").is_err());
        assert!(validate_stream_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_warehouse_requires_jdbc_url() {
        let mut config = pipeline();
        config.warehouse.jdbc_url = "postgres://host/db".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_password_never_rendered() {
        let warehouse = pipeline().warehouse;
        let debug = format!("{warehouse:?}");
        assert!(!debug.contains("hunter22"));
        assert!(debug.contains("[REDACTED]"));

        let json = serde_json::to_string(&warehouse).unwrap();
        assert!(!json.contains("hunter22"));
    }

    #[test]
    fn test_identity_defaults_are_distinct_and_valid() {
        let identities = IdentitiesConfig::default();
        assert!(identities.validate().is_ok());
        assert_eq!(identities.recorder_role.role_name, "AWSConfigRole");
        assert_eq!(identities.delivery_role.role_name, "FirehoseDeliveryRole");

        let same = IdentitiesConfig {
            recorder_role: RoleConfig::recorder_default(),
            delivery_role: RoleConfig::recorder_default(),
        };
        assert!(same.validate().is_err());
    }

    #[test]
    fn test_execution_requires_positive_concurrency() {
        let execution = ExecutionConfig {
            max_concurrent_regions: 0,
        };
        assert!(execution.validate().is_err());
        assert_eq!(ExecutionConfig::default().max_concurrent_regions, 1);
    }
}
