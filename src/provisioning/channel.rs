//! # Delivery Channel Binder
//!
//! Routes a region's recorder output to the snapshot bucket and the shared
//! streaming destination. Binding has replace semantics: the channel is always
//! redeclared, and the result only tells whether one was there before.
//!
//! The binder does not check that the region's recorder exists; the
//! orchestrator only calls it after that region's activation has returned.

use crate::constants::{delivery, events, DEFAULT_CHANNEL_NAME};
use crate::logging::{log_error, log_step_operation};
use crate::orchestration::types::{AccountContext, ProvisioningStepResult};
use crate::providers::{DeliveryChannelDefinition, DeliveryChannelService};
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct DeliveryChannelBinder {
    channels: Arc<dyn DeliveryChannelService>,
    channel_name: String,
}

impl DeliveryChannelBinder {
    pub fn new(channels: Arc<dyn DeliveryChannelService>) -> Self {
        Self {
            channels,
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// The channel definition bound in every region
    pub fn definition(
        &self,
        account: &AccountContext,
        bucket_name: &str,
        stream_name: &str,
    ) -> DeliveryChannelDefinition {
        DeliveryChannelDefinition {
            name: self.channel_name.clone(),
            s3_bucket_name: bucket_name.to_string(),
            streaming_destination_arn: account.streaming_destination_arn(stream_name),
            snapshot_delivery_frequency: delivery::SNAPSHOT_DELIVERY_FREQUENCY.to_string(),
        }
    }

    #[instrument(skip(self, account), fields(account_id = %account.account_id()))]
    pub async fn bind(
        &self,
        account: &AccountContext,
        region: &str,
        bucket_name: &str,
        stream_name: &str,
    ) -> ProvisioningStepResult {
        let definition = self.definition(account, bucket_name, stream_name);
        let result = self.declare(region, &definition).await;

        log_step_operation(
            events::CHANNEL_BOUND,
            Some(region),
            &self.channel_name,
            result.label(),
            Some(&definition.streaming_destination_arn),
        );
        if let Some(failure) = result.failure() {
            log_error("delivery_channel_binder", "bind", &failure.to_string(), Some(region));
        }
        result
    }

    async fn declare(
        &self,
        region: &str,
        definition: &DeliveryChannelDefinition,
    ) -> ProvisioningStepResult {
        let existed = match self
            .channels
            .describe_channel(region, &definition.name)
            .await
        {
            Ok(existing) => existing.is_some(),
            Err(err) => return ProvisioningStepResult::from_provider_error(&err),
        };

        match self.channels.put_channel(region, definition).await {
            Ok(()) if existed => ProvisioningStepResult::Replaced,
            Ok(()) => ProvisioningStepResult::Created,
            Err(err) => ProvisioningStepResult::from_provider_error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::FailureKind;
    use crate::providers::{IdentityService, InMemoryCloud, RecorderDefinition, RecorderService};

    async fn cloud_with_recorder(region: &str) -> Arc<InMemoryCloud> {
        let cloud = Arc::new(InMemoryCloud::new("123456789012"));
        cloud.create_role("AWSConfigRole", "{}").await.unwrap();
        cloud
            .put_recorder(
                region,
                &RecorderDefinition::full_coverage(
                    "default",
                    "arn:aws:iam::123456789012:role/AWSConfigRole",
                ),
            )
            .await
            .unwrap();
        cloud
    }

    #[tokio::test]
    async fn test_bind_created_then_replaced() {
        let cloud = cloud_with_recorder("us-west-2").await;
        let binder = DeliveryChannelBinder::new(cloud.clone());
        let account = AccountContext::new("123456789012", "aws");

        let first = binder.bind(&account, "us-west-2", "b1", "s1").await;
        assert_eq!(first, ProvisioningStepResult::Created);

        let second = binder.bind(&account, "us-west-2", "b1", "s1").await;
        assert_eq!(second, ProvisioningStepResult::Replaced);

        let channel = cloud.channel("us-west-2").unwrap();
        assert_eq!(channel.s3_bucket_name, "b1");
        assert_eq!(
            channel.streaming_destination_arn,
            "arn:aws:kinesis::123456789012:stream/s1"
        );
        assert_eq!(channel.snapshot_delivery_frequency, "One_Hour");
    }

    #[tokio::test]
    async fn test_bind_without_recorder_is_rejected_by_provider() {
        let cloud = Arc::new(InMemoryCloud::new("123456789012"));
        let binder = DeliveryChannelBinder::new(cloud);
        let account = AccountContext::new("123456789012", "aws");

        let result = binder.bind(&account, "eu-west-1", "b1", "s1").await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::InvalidRequest);
    }
}
