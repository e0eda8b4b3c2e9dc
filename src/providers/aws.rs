//! # AWS Backend
//!
//! Implements the provider traits with the AWS SDK: STS for the account
//! context, IAM for roles, AWS Config for recorders and delivery channels, and
//! Kinesis Data Firehose for the load stream. One shared SDK configuration is
//! loaded from the default credential chain; regional clients are built from
//! it on first use and cached.
//!
//! SDK errors are mapped into [`ProviderError`] here and nowhere else.

use super::{
    AccountResolver, DeliveryChannelDefinition, DeliveryChannelService, DeliveryStreamDefinition,
    DeliveryStreamService, IdentityService, ProviderError, ProviderResult, RecorderDefinition,
    RecorderService, RecorderStatus,
};
use crate::constants::DEFAULT_PARTITION;
use crate::orchestration::types::AccountContext;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_config::types::{
    ConfigSnapshotDeliveryProperties, ConfigurationRecorder, DeliveryChannel,
    MaximumExecutionFrequency, RecordingGroup,
};
use aws_sdk_firehose::types::{
    BufferingHints, CompressionFormat, CopyCommand, DeliveryStreamType,
    RedshiftDestinationConfiguration, S3DestinationConfiguration,
};
use aws_sdk_iam::error::{ProvideErrorMetadata, SdkError};
use dashmap::DashMap;
use std::fmt;
use tracing::{debug, warn};

/// Map an SDK error into the provider taxonomy
fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => {
            ProviderError::from_code(operation, "TimeoutError", err.to_string())
        }
        SdkError::DispatchFailure(_) => {
            ProviderError::from_code(operation, "DispatchFailure", err.to_string())
        }
        _ => {
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            ProviderError::from_code(operation, code, message)
        }
    }
}

fn build_error(operation: &str, err: impl fmt::Display) -> ProviderError {
    ProviderError::from_code(operation, "ValidationException", err.to_string())
}

pub struct AwsCloud {
    sdk_config: SdkConfig,
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    config_clients: DashMap<String, aws_sdk_config::Client>,
    firehose_clients: DashMap<String, aws_sdk_firehose::Client>,
}

impl AwsCloud {
    /// Load the default credential chain and region configuration
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::from_sdk_config(sdk_config)
    }

    pub fn from_sdk_config(sdk_config: SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(&sdk_config),
            sts: aws_sdk_sts::Client::new(&sdk_config),
            config_clients: DashMap::new(),
            firehose_clients: DashMap::new(),
            sdk_config,
        }
    }

    fn config_client(&self, region: &str) -> aws_sdk_config::Client {
        self.config_clients
            .entry(region.to_string())
            .or_insert_with(|| {
                let conf = aws_sdk_config::config::Builder::from(&self.sdk_config)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_config::Client::from_conf(conf)
            })
            .clone()
    }

    fn firehose_client(&self, region: &str) -> aws_sdk_firehose::Client {
        self.firehose_clients
            .entry(region.to_string())
            .or_insert_with(|| {
                let conf = aws_sdk_firehose::config::Builder::from(&self.sdk_config)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_firehose::Client::from_conf(conf)
            })
            .clone()
    }
}

impl fmt::Debug for AwsCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCloud")
            .field("region", &self.sdk_config.region())
            .field("config_clients", &self.config_clients.len())
            .field("firehose_clients", &self.firehose_clients.len())
            .finish()
    }
}

#[async_trait]
impl AccountResolver for AwsCloud {
    async fn resolve_account(&self) -> ProviderResult<AccountContext> {
        const OPERATION: &str = "GetCallerIdentity";
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| map_sdk_error(OPERATION, e))?;

        let account_id = identity.account().ok_or_else(|| {
            ProviderError::from_code(OPERATION, "Unknown", "caller identity has no account")
        })?;
        let partition = identity
            .arn()
            .and_then(|arn| arn.split(':').nth(1))
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PARTITION);

        let mut account = AccountContext::new(account_id, partition);
        if let Some(arn) = identity.arn() {
            account = account.with_caller_arn(arn);
        }
        Ok(account)
    }
}

#[async_trait]
impl IdentityService for AwsCloud {
    async fn create_role(
        &self,
        role_name: &str,
        trust_policy_document: &str,
    ) -> ProviderResult<()> {
        self.iam
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust_policy_document)
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateRole", e))?;
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| map_sdk_error("AttachRolePolicy", e))?;
        Ok(())
    }
}

#[async_trait]
impl RecorderService for AwsCloud {
    async fn describe_recorder(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<RecorderStatus>> {
        let output = match self
            .config_client(region)
            .describe_configuration_recorders()
            .configuration_recorder_names(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = map_sdk_error("DescribeConfigurationRecorders", err);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };

        // Only name and role are compared; the recording group is always
        // redeclared as full coverage.
        Ok(output
            .configuration_recorders()
            .iter()
            .find(|recorder| recorder.name() == Some(name))
            .map(|recorder| RecorderStatus {
                definition: RecorderDefinition::full_coverage(
                    name,
                    recorder.role_arn().unwrap_or_default(),
                ),
                recording: false,
            }))
    }

    async fn put_recorder(
        &self,
        region: &str,
        recorder: &RecorderDefinition,
    ) -> ProviderResult<()> {
        let recording_group = RecordingGroup::builder()
            .all_supported(recorder.all_supported)
            .include_global_resource_types(recorder.include_global_resource_types)
            .build();
        let definition = ConfigurationRecorder::builder()
            .name(&recorder.name)
            .role_arn(&recorder.role_arn)
            .recording_group(recording_group)
            .build();

        self.config_client(region)
            .put_configuration_recorder()
            .configuration_recorder(definition)
            .send()
            .await
            .map_err(|e| map_sdk_error("PutConfigurationRecorder", e))?;
        Ok(())
    }

    async fn start_recorder(&self, region: &str, name: &str) -> ProviderResult<()> {
        self.config_client(region)
            .start_configuration_recorder()
            .configuration_recorder_name(name)
            .send()
            .await
            .map_err(|e| map_sdk_error("StartConfigurationRecorder", e))?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannelService for AwsCloud {
    async fn describe_channel(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<DeliveryChannelDefinition>> {
        let output = match self
            .config_client(region)
            .describe_delivery_channels()
            .delivery_channel_names(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = map_sdk_error("DescribeDeliveryChannels", err);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };

        Ok(output
            .delivery_channels()
            .iter()
            .find(|channel| channel.name() == Some(name))
            .map(|channel| DeliveryChannelDefinition {
                name: name.to_string(),
                s3_bucket_name: channel.s3_bucket_name().unwrap_or_default().to_string(),
                streaming_destination_arn: String::new(),
                snapshot_delivery_frequency: channel
                    .config_snapshot_delivery_properties()
                    .and_then(|p| p.delivery_frequency())
                    .map(|f| f.as_str().to_string())
                    .unwrap_or_default(),
            }))
    }

    async fn put_channel(
        &self,
        region: &str,
        channel: &DeliveryChannelDefinition,
    ) -> ProviderResult<()> {
        // The Config API has no streaming destination on a delivery channel;
        // the stream is reached through the snapshot bucket.
        debug!(
            region = %region,
            streaming_destination_arn = %channel.streaming_destination_arn,
            "Streaming destination is not part of the AWS Config channel definition"
        );

        let properties = ConfigSnapshotDeliveryProperties::builder()
            .delivery_frequency(MaximumExecutionFrequency::from(
                channel.snapshot_delivery_frequency.as_str(),
            ))
            .build();
        let definition = DeliveryChannel::builder()
            .name(&channel.name)
            .s3_bucket_name(&channel.s3_bucket_name)
            .config_snapshot_delivery_properties(properties)
            .build();

        self.config_client(region)
            .put_delivery_channel()
            .delivery_channel(definition)
            .send()
            .await
            .map_err(|e| map_sdk_error("PutDeliveryChannel", e))?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryStreamService for AwsCloud {
    async fn create_delivery_stream(
        &self,
        region: &str,
        stream: &DeliveryStreamDefinition,
    ) -> ProviderResult<String> {
        const OPERATION: &str = "CreateDeliveryStream";

        let copy_command = CopyCommand::builder()
            .data_table_name(&stream.copy_command.table_name)
            .data_table_columns(stream.copy_command.columns.join(","))
            .copy_options(&stream.copy_command.copy_options)
            .build()
            .map_err(|e| build_error(OPERATION, e))?;

        let staging = S3DestinationConfiguration::builder()
            .role_arn(&stream.staging.role_arn)
            .bucket_arn(&stream.staging.bucket_arn)
            .prefix(&stream.staging.prefix)
            .buffering_hints(
                BufferingHints::builder()
                    .interval_in_seconds(stream.staging.buffering_interval_seconds)
                    .size_in_m_bs(stream.staging.buffering_size_mib)
                    .build(),
            )
            .compression_format(CompressionFormat::from(stream.staging.compression.as_str()))
            .build()
            .map_err(|e| build_error(OPERATION, e))?;

        let destination = RedshiftDestinationConfiguration::builder()
            .role_arn(&stream.role_arn)
            .cluster_jdbcurl(&stream.jdbc_url)
            .copy_command(copy_command)
            .username(&stream.username)
            .password(&stream.password)
            .s3_configuration(staging)
            .build()
            .map_err(|e| build_error(OPERATION, e))?;

        let output = self
            .firehose_client(region)
            .create_delivery_stream()
            .delivery_stream_name(&stream.name)
            .delivery_stream_type(DeliveryStreamType::DirectPut)
            .redshift_destination_configuration(destination)
            .send()
            .await
            .map_err(|e| map_sdk_error(OPERATION, e))?;

        match output.delivery_stream_arn() {
            Some(arn) => Ok(arn.to_string()),
            None => {
                warn!(region = %region, stream_name = %stream.name, "CreateDeliveryStream returned no ARN");
                Err(ProviderError::from_code(
                    OPERATION,
                    "Unknown",
                    "delivery stream created without an ARN",
                ))
            }
        }
    }

    async fn describe_delivery_stream(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<String>> {
        match self
            .firehose_client(region)
            .describe_delivery_stream()
            .delivery_stream_name(name)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .delivery_stream_description()
                .map(|description| description.delivery_stream_arn().to_string())),
            Err(err) => {
                let err = map_sdk_error("DescribeDeliveryStream", err);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }
}
