//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use recorder_pipeline::config::{ExecutionConfig, IdentitiesConfig, PipelineConfiguration, WarehouseConfig};
use recorder_pipeline::providers::memory::{Operation, ProviderCall};
use recorder_pipeline::providers::{
    InMemoryCloud, ProviderResult, ProviderSet, RecorderDefinition, RecorderService,
    RecorderStatus,
};
use recorder_pipeline::RegionOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const ACCOUNT_ID: &str = "123456789012";
pub const BUCKET: &str = "b1";
pub const STREAM: &str = "s1";

pub fn pipeline(regions: &[&str]) -> PipelineConfiguration {
    PipelineConfiguration::new(
        regions.iter().map(|r| r.to_string()).collect(),
        BUCKET,
        STREAM,
        WarehouseConfig::new(
            "jdbc:redshift://config-warehouse.example.com:5439/dev",
            "aws_config_resources",
            "loader",
            "warehouse-secret",
        ),
    )
}

pub fn cloud() -> Arc<InMemoryCloud> {
    Arc::new(InMemoryCloud::new(ACCOUNT_ID))
}

pub fn slow_cloud(latency_ms: u64) -> Arc<InMemoryCloud> {
    Arc::new(InMemoryCloud::new(ACCOUNT_ID).with_latency(Duration::from_millis(latency_ms)))
}

pub fn orchestrator(cloud: &Arc<InMemoryCloud>) -> RegionOrchestrator {
    RegionOrchestrator::new(ProviderSet::from_backend(cloud.clone()))
}

pub fn concurrent_orchestrator(cloud: &Arc<InMemoryCloud>, max: usize) -> RegionOrchestrator {
    RegionOrchestrator::with_settings(
        ProviderSet::from_backend(cloud.clone()),
        IdentitiesConfig::default(),
        ExecutionConfig {
            max_concurrent_regions: max,
        },
    )
}

/// Journal entries for one region, in call order
pub fn region_calls(cloud: &InMemoryCloud, region: &str) -> Vec<ProviderCall> {
    cloud
        .calls()
        .into_iter()
        .filter(|call| call.region.as_deref() == Some(region))
        .collect()
}

/// Sequence of the last recorder call and first channel call in a region
pub fn recorder_and_channel_bounds(cloud: &InMemoryCloud, region: &str) -> (Option<u64>, Option<u64>) {
    let calls = region_calls(cloud, region);
    let last_recorder = calls
        .iter()
        .filter(|c| {
            matches!(
                c.operation,
                Operation::DescribeRecorder | Operation::PutRecorder | Operation::StartRecorder
            )
        })
        .map(|c| c.sequence)
        .max();
    let first_channel = calls
        .iter()
        .filter(|c| matches!(c.operation, Operation::DescribeChannel | Operation::PutChannel))
        .map(|c| c.sequence)
        .min();
    (last_recorder, first_channel)
}

/// Recorder service that trips a cancellation token once the recorder in
/// `trigger_region` has been started
pub struct CancelAfterStart {
    pub inner: Arc<InMemoryCloud>,
    pub trigger_region: String,
    pub token: CancellationToken,
}

#[async_trait]
impl RecorderService for CancelAfterStart {
    async fn describe_recorder(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<RecorderStatus>> {
        self.inner.describe_recorder(region, name).await
    }

    async fn put_recorder(&self, region: &str, recorder: &RecorderDefinition) -> ProviderResult<()> {
        self.inner.put_recorder(region, recorder).await
    }

    async fn start_recorder(&self, region: &str, name: &str) -> ProviderResult<()> {
        let result = self.inner.start_recorder(region, name).await;
        if region == self.trigger_region {
            self.token.cancel();
        }
        result
    }
}
