//! # Region Orchestrator
//!
//! Drives one provisioning run through its state machine:
//!
//! 1. `Init`: validate configuration and resolve the account context. No
//!    provider mutation happens before validation passes.
//! 2. `ProvisioningIdentities`: ensure the recorder role and the delivery
//!    role. Any identity failure aborts the run before a region is touched.
//! 3. `ProvisioningRegions(i)`: per region, activate the recorder, then bind
//!    the channel. Region failures are recorded and never stop sibling
//!    regions. Regions run one at a time, or up to `max_concurrent_regions`
//!    at once; in both modes a region's channel waits for its own recorder.
//! 4. `ProvisioningStream`: reached only once every started region has
//!    reported back. Declares the load stream once, in the home region.
//!
//! Cancellation is observed before each region starts. Resources created so
//! far are left in place; re-running the pipeline converges them.

use super::report::{IdentityReport, RegionReport, RunReport, StreamReport};
use super::types::{AccountContext, RegionDescriptor, StepFailure, WarehouseTarget};
use crate::config::{ExecutionConfig, IdentitiesConfig, PipelineConfiguration, ProvisionerConfig};
use crate::constants::events;
use crate::error::PipelineError;
use crate::logging::{log_error, log_step_operation};
use crate::orchestration::types::ProvisioningStepResult;
use crate::providers::ProviderSet;
use crate::provisioning::{
    DeliveryChannelBinder, IdentityProvisioner, RecorderActivator, StreamProvisioner,
};
use crate::state_machine::{RunEvent, RunState, RunStateMachine};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Per-region work shared by every region task
#[derive(Clone)]
struct RegionSteps {
    recorder: RecorderActivator,
    channel: DeliveryChannelBinder,
}

impl RegionSteps {
    /// Recorder first, then channel. A failed recorder leaves the channel
    /// unattempted and reported as a dependency failure.
    async fn run(
        &self,
        account: &AccountContext,
        descriptor: &RegionDescriptor,
        bucket_name: &str,
        stream_name: &str,
    ) -> RegionReport {
        let region = descriptor.region.as_str();
        let recorder = self
            .recorder
            .activate(account, region, &descriptor.recorder_role_arn)
            .await;

        let channel = if recorder.is_failure() {
            ProvisioningStepResult::Failed(StepFailure::dependency_failed(format!(
                "channel {} not bound: recorder {} failed to activate",
                descriptor.channel_name, descriptor.recorder_name
            )))
        } else {
            self.channel
                .bind(account, region, bucket_name, stream_name)
                .await
        };

        let report = RegionReport {
            region: region.to_string(),
            recorder,
            channel,
        };
        log_step_operation(
            events::REGION_FINISHED,
            Some(region),
            &descriptor.recorder_name,
            if report.succeeded() { "succeeded" } else { "failed" },
            None,
        );
        report
    }
}

/// Outcome of one region slot in a concurrent run
enum RegionSlot {
    Finished,
    Skipped,
}

pub struct RegionOrchestrator {
    providers: ProviderSet,
    identities: IdentitiesConfig,
    execution: ExecutionConfig,
    identity: IdentityProvisioner,
    steps: RegionSteps,
    stream: StreamProvisioner,
}

impl RegionOrchestrator {
    pub fn new(providers: ProviderSet) -> Self {
        Self::with_settings(providers, IdentitiesConfig::default(), ExecutionConfig::default())
    }

    pub fn with_settings(
        providers: ProviderSet,
        identities: IdentitiesConfig,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            identity: IdentityProvisioner::new(providers.identity.clone()),
            steps: RegionSteps {
                recorder: RecorderActivator::new(providers.recorders.clone()),
                channel: DeliveryChannelBinder::new(providers.channels.clone()),
            },
            stream: StreamProvisioner::new(providers.streams.clone()),
            providers,
            identities,
            execution,
        }
    }

    /// Build from a loaded configuration file
    pub fn from_config(config: &ProvisionerConfig, providers: ProviderSet) -> Self {
        Self::with_settings(
            providers,
            config.identities.clone(),
            config.execution.clone(),
        )
    }

    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// Run to completion without external cancellation
    pub async fn run(&self, config: &PipelineConfiguration) -> RunReport {
        self.run_with_cancellation(config, CancellationToken::new())
            .await
    }

    /// Run, checking `cancel` before each region starts
    #[instrument(skip_all, fields(regions = config.regions.len()))]
    pub async fn run_with_cancellation(
        &self,
        config: &PipelineConfiguration,
        cancel: CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let mut machine = RunStateMachine::new(&run_id, config.regions.len());
        let mut report = RunReport::new(&run_id, config);

        info!(
            run_id = %run_id,
            regions = ?config.regions,
            max_concurrent_regions = self.execution.max_concurrent_regions,
            "{}",
            events::RUN_STARTED
        );

        if let Err(err) = self.drive(config, &cancel, &mut machine, &mut report).await {
            log_error("region_orchestrator", "run", &err.to_string(), Some(&run_id));
            if report.error.is_none() {
                report.error = Some(err.to_string());
            }
        }

        let final_state = machine.current_state();
        report.finish(final_state, machine.into_history());

        let event = match final_state {
            RunState::Done => events::RUN_COMPLETED,
            RunState::Failed => events::RUN_FAILED,
            RunState::Cancelled => events::RUN_CANCELLED,
            _ => events::RUN_ABORTED,
        };
        info!(
            run_id = %report.run_id,
            final_state = %final_state,
            failed_regions = report.failed_regions().len(),
            skipped_regions = report.skipped_regions.len(),
            stream_arn = report.stream_arn(),
            "{}",
            event
        );
        report
    }

    async fn drive(
        &self,
        config: &PipelineConfiguration,
        cancel: &CancellationToken,
        machine: &mut RunStateMachine,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        // Init
        let validation = config
            .validate()
            .and_then(|()| self.identities.validate())
            .and_then(|()| self.execution.validate());
        if let Err(err) = validation {
            let reason = format!("configuration invalid: {err}");
            report.error = Some(reason.clone());
            machine.transition(RunEvent::Abort(reason))?;
            return Ok(());
        }

        let account = match self.providers.account.resolve_account().await {
            Ok(account) => account,
            Err(err) => {
                let reason = format!("account context could not be resolved: {err}");
                report.error = Some(reason.clone());
                machine.transition(RunEvent::Abort(reason))?;
                return Ok(());
            }
        };
        report.account_id = Some(account.account_id().to_string());
        machine.transition(RunEvent::Start)?;

        // ProvisioningIdentities
        for role in [&self.identities.recorder_role, &self.identities.delivery_role] {
            let result = self.identity.ensure(&account, role).await;
            report.identities.push(IdentityReport {
                role_name: role.role_name.clone(),
                role_arn: result
                    .is_success()
                    .then(|| account.role_arn(&role.role_name)),
                result,
            });
        }

        let failed_identity = report
            .identities
            .iter()
            .find_map(|i| i.result.failure().map(|f| (i.role_name.clone(), f.clone())));
        if let Some((role_name, failure)) = failed_identity {
            let err = PipelineError::identity_provisioning(role_name, failure.to_string());
            report.error = Some(err.to_string());
            machine.transition(RunEvent::Abort(err.to_string()))?;
            return Ok(());
        }
        machine.transition(RunEvent::IdentitiesReady)?;

        // ProvisioningRegions(i)
        let descriptors: Vec<RegionDescriptor> = config
            .regions
            .iter()
            .map(|region| {
                RegionDescriptor::derive(
                    &account,
                    region,
                    &self.identities.recorder_role.role_name,
                    &self.identities.delivery_role.role_name,
                    &config.stream_name,
                )
            })
            .collect();

        let cancelled = if self.execution.max_concurrent_regions <= 1 {
            self.run_regions_sequentially(&account, &descriptors, config, cancel, machine, report)
                .await?
        } else {
            self.run_regions_concurrently(&account, &descriptors, config, cancel, machine, report)
                .await?
        };

        if cancelled {
            warn!(
                run_id = %machine.run_id(),
                completed_regions = report.regions.len(),
                skipped = ?report.skipped_regions,
                "Cancellation observed, stopping before remaining regions"
            );
            report.error = Some(format!(
                "cancelled after {} of {} region(s)",
                report.regions.len(),
                descriptors.len()
            ));
            machine.transition(RunEvent::Cancel)?;
            return Ok(());
        }

        // ProvisioningStream: every region has returned.
        let home_region = match config.home_region() {
            Some(region) => region,
            None => return Err(PipelineError::aborted("no home region")),
        };
        let warehouse = WarehouseTarget::from(&config.warehouse);
        let delivery_role_arn = account.role_arn(&self.identities.delivery_role.role_name);

        match self
            .stream
            .provision(
                &account,
                home_region,
                &config.stream_name,
                &delivery_role_arn,
                &warehouse,
                &config.bucket_name,
            )
            .await
        {
            Ok(record) => {
                let arn = record.arn.clone();
                report.stream = Some(StreamReport::from_record(record));
                machine.transition(RunEvent::StreamProvisioned(arn))?;
            }
            Err(failure) => {
                let reason = failure.to_string();
                report.stream = Some(StreamReport::from_failure(
                    &config.stream_name,
                    home_region,
                    failure,
                ));
                report.error = Some(
                    PipelineError::stream_provisioning(&config.stream_name, &reason).to_string(),
                );
                machine.transition(RunEvent::StreamFailed(reason))?;
            }
        }

        Ok(())
    }

    /// Returns true when cancellation stopped the loop early
    async fn run_regions_sequentially(
        &self,
        account: &AccountContext,
        descriptors: &[RegionDescriptor],
        config: &PipelineConfiguration,
        cancel: &CancellationToken,
        machine: &mut RunStateMachine,
        report: &mut RunReport,
    ) -> Result<bool, PipelineError> {
        for (index, descriptor) in descriptors.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped_regions = descriptors[index..]
                    .iter()
                    .map(|d| d.region.clone())
                    .collect();
                return Ok(true);
            }

            let region_report = self
                .steps
                .run(account, descriptor, &config.bucket_name, &config.stream_name)
                .await;
            report.regions.push(region_report);
            machine.transition(RunEvent::RegionFinished(descriptor.region.clone()))?;
        }
        Ok(false)
    }

    /// Up to `max_concurrent_regions` regions in flight. Each task writes its
    /// entry into a slot under a lock; the driver advances the state machine
    /// as tasks complete and only returns once all of them have.
    async fn run_regions_concurrently(
        &self,
        account: &AccountContext,
        descriptors: &[RegionDescriptor],
        config: &PipelineConfiguration,
        cancel: &CancellationToken,
        machine: &mut RunStateMachine,
        report: &mut RunReport,
    ) -> Result<bool, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.execution.max_concurrent_regions));
        let slots: Arc<Mutex<Vec<Option<RegionReport>>>> =
            Arc::new(Mutex::new(vec![None; descriptors.len()]));

        let mut pending = FuturesUnordered::new();
        for (index, descriptor) in descriptors.iter().cloned().enumerate() {
            let steps = self.steps.clone();
            let account = account.clone();
            let semaphore = semaphore.clone();
            let slots = slots.clone();
            let cancel = cancel.clone();
            let bucket_name = config.bucket_name.clone();
            let stream_name = config.stream_name.clone();
            let region = descriptor.region.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return RegionSlot::Skipped;
                };
                if cancel.is_cancelled() {
                    return RegionSlot::Skipped;
                }
                let region_report = steps
                    .run(&account, &descriptor, &bucket_name, &stream_name)
                    .await;
                slots.lock()[index] = Some(region_report);
                RegionSlot::Finished
            });
            pending.push(handle.map(move |joined| (index, region, joined)));
        }

        let mut skipped = Vec::new();
        while let Some((index, region, joined)) = pending.next().await {
            match joined {
                Ok(RegionSlot::Finished) => {}
                Ok(RegionSlot::Skipped) => {
                    skipped.push(index);
                    continue;
                }
                Err(join_error) => {
                    log_error(
                        "region_orchestrator",
                        "region_task",
                        &join_error.to_string(),
                        Some(&region),
                    );
                    slots.lock()[index] = Some(RegionReport {
                        region: region.clone(),
                        recorder: ProvisioningStepResult::failed(
                            super::types::FailureKind::Unknown,
                            format!("region task did not complete: {join_error}"),
                        ),
                        channel: ProvisioningStepResult::Failed(StepFailure::dependency_failed(
                            "region task did not complete",
                        )),
                    });
                }
            }
            machine.transition(RunEvent::RegionFinished(region))?;
        }

        let finished: Vec<Option<RegionReport>> = std::mem::take(&mut *slots.lock());
        report.regions = finished.into_iter().flatten().collect();

        skipped.sort_unstable();
        report.skipped_regions = skipped
            .into_iter()
            .map(|index| descriptors[index].region.clone())
            .collect();
        Ok(!report.skipped_regions.is_empty())
    }
}

/// Provision a pipeline with default identities and sequential regions
pub async fn provision_pipeline(config: &PipelineConfiguration, providers: ProviderSet) -> RunReport {
    RegionOrchestrator::new(providers).run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use crate::providers::memory::Operation;
    use crate::providers::InMemoryCloud;

    fn pipeline(regions: &[&str]) -> PipelineConfiguration {
        PipelineConfiguration::new(
            regions.iter().map(|r| r.to_string()).collect(),
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

    fn orchestrator() -> (Arc<InMemoryCloud>, RegionOrchestrator) {
        let cloud = Arc::new(InMemoryCloud::new("123456789012"));
        let orchestrator = RegionOrchestrator::new(ProviderSet::from_backend(cloud.clone()));
        (cloud, orchestrator)
    }

    #[tokio::test]
    async fn test_invalid_configuration_aborts_before_provider_calls() {
        let (cloud, orchestrator) = orchestrator();
        let report = orchestrator.run(&pipeline(&[])).await;

        assert_eq!(report.final_state, RunState::Aborted);
        assert!(report.error.unwrap().contains("configuration invalid"));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_account_resolution_failure_aborts() {
        let (cloud, orchestrator) = orchestrator();
        cloud.fail(Operation::ResolveAccount, None, "ExpiredToken", "expired");

        let report = orchestrator.run(&pipeline(&["us-west-2"])).await;
        assert_eq!(report.final_state, RunState::Aborted);
        assert!(report.account_id.is_none());
        assert_eq!(cloud.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_identity_failure_aborts_before_regions() {
        let (cloud, orchestrator) = orchestrator();
        cloud.fail(Operation::AttachRolePolicy, None, "AccessDenied", "denied");

        let report = orchestrator.run(&pipeline(&["us-west-2"])).await;
        assert_eq!(report.final_state, RunState::Aborted);
        assert_eq!(report.identities.len(), 2);
        assert!(report.regions.is_empty());
        assert!(cloud.calls_for(Operation::PutRecorder).is_empty());
        assert!(cloud.calls_for(Operation::CreateDeliveryStream).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_region() {
        let (cloud, orchestrator) = orchestrator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator
            .run_with_cancellation(&pipeline(&["us-west-2", "us-east-1"]), cancel)
            .await;
        assert_eq!(report.final_state, RunState::Cancelled);
        assert_eq!(report.skipped_regions, vec!["us-west-2", "us-east-1"]);
        // Identities were already ensured and stay in place.
        assert!(cloud.has_role("AWSConfigRole"));
        assert!(cloud.calls_for(Operation::CreateDeliveryStream).is_empty());
    }

    #[tokio::test]
    async fn test_transitions_recorded_in_order() {
        let (_cloud, orchestrator) = orchestrator();
        let report = orchestrator.run(&pipeline(&["us-west-2", "us-east-1"])).await;

        let states: Vec<String> = report.transitions.iter().map(|t| t.to.to_string()).collect();
        assert_eq!(
            states,
            vec![
                "provisioning_identities",
                "provisioning_regions(0)",
                "provisioning_regions(1)",
                "provisioning_stream",
                "done",
            ]
        );
        assert!(report.succeeded());
    }
}
