//! # Streaming Load Stream Provisioner
//!
//! Declares the single direct-put delivery stream that batches recorder
//! output and copies it into the warehouse table. Runs once per pipeline, in
//! the home region. The warehouse password is handed to the provider and
//! nowhere else.

use crate::constants::{delivery, events, WAREHOUSE_TABLE_COLUMNS};
use crate::logging::{log_error, log_step_operation};
use crate::orchestration::types::{
    AccountContext, DeliveryStreamRecord, ProvisioningStepResult, StepFailure, WarehouseTarget,
};
use crate::providers::{
    CopyCommand, DeliveryStreamDefinition, DeliveryStreamService, StagingConfiguration,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct StreamProvisioner {
    streams: Arc<dyn DeliveryStreamService>,
}

impl StreamProvisioner {
    pub fn new(streams: Arc<dyn DeliveryStreamService>) -> Self {
        Self { streams }
    }

    /// Build the stream definition; staging reuses the snapshot bucket
    pub fn definition(
        &self,
        account: &AccountContext,
        stream_name: &str,
        role_arn: &str,
        warehouse: &WarehouseTarget,
        bucket_name: &str,
    ) -> DeliveryStreamDefinition {
        DeliveryStreamDefinition {
            name: stream_name.to_string(),
            role_arn: role_arn.to_string(),
            jdbc_url: warehouse.jdbc_url.clone(),
            copy_command: CopyCommand {
                table_name: warehouse.table_name.clone(),
                columns: WAREHOUSE_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                copy_options: warehouse.copy_options().to_string(),
            },
            username: warehouse.username.clone(),
            password: warehouse.password().to_string(),
            staging: StagingConfiguration {
                role_arn: role_arn.to_string(),
                bucket_arn: account.bucket_arn(bucket_name),
                prefix: delivery::STAGING_PREFIX.to_string(),
                buffering_interval_seconds: delivery::STAGING_BUFFER_INTERVAL_SECONDS,
                buffering_size_mib: delivery::STAGING_BUFFER_SIZE_MIB,
                compression: delivery::STAGING_COMPRESSION.to_string(),
            },
        }
    }

    /// Declare the load stream in `home_region`.
    ///
    /// An existing stream of the same name counts as success and is reported
    /// as `AlreadyExists` with its identifier.
    #[instrument(
        skip(self, account, warehouse),
        fields(account_id = %account.account_id(), table = %warehouse.table_name)
    )]
    pub async fn provision(
        &self,
        account: &AccountContext,
        home_region: &str,
        stream_name: &str,
        role_arn: &str,
        warehouse: &WarehouseTarget,
        bucket_name: &str,
    ) -> Result<DeliveryStreamRecord, StepFailure> {
        let definition = self.definition(account, stream_name, role_arn, warehouse, bucket_name);

        let outcome = match self
            .streams
            .create_delivery_stream(home_region, &definition)
            .await
        {
            Ok(arn) => Ok((arn, ProvisioningStepResult::Created)),
            Err(err) if err.is_already_exists() => {
                let arn = match self
                    .streams
                    .describe_delivery_stream(home_region, stream_name)
                    .await
                {
                    Ok(Some(arn)) => arn,
                    Ok(None) => {
                        warn!(
                            region = %home_region,
                            stream_name = %stream_name,
                            "Existing delivery stream not returned by describe, deriving its ARN"
                        );
                        account.delivery_stream_arn(home_region, stream_name)
                    }
                    Err(describe_err) => {
                        warn!(
                            region = %home_region,
                            stream_name = %stream_name,
                            error_code = %describe_err.code,
                            error_kind = %describe_err.kind,
                            error = %describe_err,
                            "Existing delivery stream could not be described, deriving its ARN"
                        );
                        account.delivery_stream_arn(home_region, stream_name)
                    }
                };
                Ok((arn, ProvisioningStepResult::AlreadyExists))
            }
            Err(err) => Err(StepFailure::from_provider(&err)),
        };

        match outcome {
            Ok((arn, outcome)) => {
                log_step_operation(
                    events::STREAM_PROVISIONED,
                    Some(home_region),
                    stream_name,
                    outcome.label(),
                    Some(&arn),
                );
                info!(stream_arn = %arn, "Delivery stream ready");
                Ok(DeliveryStreamRecord {
                    stream_name: stream_name.to_string(),
                    region: home_region.to_string(),
                    arn,
                    outcome,
                })
            }
            Err(failure) => {
                log_step_operation(
                    events::STREAM_PROVISIONED,
                    Some(home_region),
                    stream_name,
                    "failed",
                    None,
                );
                log_error("stream_provisioner", "provision", &failure.to_string(), Some(home_region));
                Err(failure)
            }
        }
    }
}
