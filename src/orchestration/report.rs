//! # Run Report
//!
//! The externally observable result of a provisioning run: every identity,
//! every region and the stream outcome, listed individually so a partially
//! successful run can be diagnosed without re-running it.

use super::types::{DeliveryStreamRecord, ProvisioningStepResult, StepFailure};
use crate::config::PipelineConfiguration;
use crate::error::{PipelineError, Result};
use crate::state_machine::{RunState, TransitionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityReport {
    pub role_name: String,
    pub role_arn: Option<String>,
    pub result: ProvisioningStepResult,
}

/// The `(region, recorder_result, channel_result)` entry for one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionReport {
    pub region: String,
    pub recorder: ProvisioningStepResult,
    pub channel: ProvisioningStepResult,
}

impl RegionReport {
    pub fn succeeded(&self) -> bool {
        self.recorder.is_success() && self.channel.is_success()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    pub stream_name: String,
    pub region: String,
    pub arn: Option<String>,
    pub result: ProvisioningStepResult,
}

impl StreamReport {
    pub fn from_record(record: DeliveryStreamRecord) -> Self {
        Self {
            stream_name: record.stream_name,
            region: record.region,
            arn: Some(record.arn),
            result: record.outcome,
        }
    }

    pub fn from_failure(stream_name: &str, region: &str, failure: StepFailure) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            region: region.to_string(),
            arn: None,
            result: ProvisioningStepResult::Failed(failure),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub account_id: Option<String>,
    pub home_region: Option<String>,
    pub final_state: RunState,
    pub identities: Vec<IdentityReport>,
    /// In configuration order, whatever order the regions finished in
    pub regions: Vec<RegionReport>,
    pub stream: Option<StreamReport>,
    /// Regions never attempted because the run was cancelled
    pub skipped_regions: Vec<String>,
    /// Why the run stopped short of `Done`, if it did
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<TransitionRecord>,
}

impl RunReport {
    pub(crate) fn new(run_id: impl Into<String>, config: &PipelineConfiguration) -> Self {
        Self {
            run_id: run_id.into(),
            account_id: None,
            home_region: config.home_region().map(str::to_string),
            final_state: RunState::Init,
            identities: Vec::new(),
            regions: Vec::new(),
            stream: None,
            skipped_regions: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self, final_state: RunState, transitions: Vec<TransitionRecord>) {
        self.final_state = final_state;
        self.transitions = transitions;
        self.finished_at = Some(Utc::now());
    }

    /// True only when the run reached `Done`
    pub fn succeeded(&self) -> bool {
        self.final_state.is_success()
    }

    pub fn failed_regions(&self) -> Vec<&RegionReport> {
        self.regions.iter().filter(|r| !r.succeeded()).collect()
    }

    pub fn region(&self, region: &str) -> Option<&RegionReport> {
        self.regions.iter().find(|r| r.region == region)
    }

    pub fn stream_arn(&self) -> Option<&str> {
        self.stream.as_ref().and_then(|s| s.arn.as_deref())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Convert a run that did not reach `Done` into the matching error
    pub fn into_result(self) -> Result<RunReport> {
        let reason = self
            .error
            .clone()
            .unwrap_or_else(|| format!("run ended in state {}", self.final_state));

        match self.final_state {
            RunState::Done => Ok(self),
            RunState::Failed => {
                let stream_name = self
                    .stream
                    .as_ref()
                    .map(|s| s.stream_name.clone())
                    .unwrap_or_default();
                Err(PipelineError::stream_provisioning(stream_name, reason))
            }
            RunState::Cancelled => Err(PipelineError::Cancelled {
                run_id: self.run_id,
                completed_regions: self.regions.len(),
            }),
            _ => Err(PipelineError::aborted(reason)),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} finished in state {} (account {})",
            self.run_id,
            self.final_state,
            self.account_id.as_deref().unwrap_or("unresolved")
        )?;

        if !self.identities.is_empty() {
            writeln!(f, "Identities:")?;
            for identity in &self.identities {
                writeln!(f, "  {:<32} {}", identity.role_name, identity.result)?;
            }
        }

        if !self.regions.is_empty() {
            writeln!(f, "Regions:")?;
            for region in &self.regions {
                writeln!(
                    f,
                    "  {:<16} recorder: {:<16} channel: {}",
                    region.region,
                    region.recorder.label(),
                    region.channel
                )?;
                if let Some(failure) = region.recorder.failure() {
                    writeln!(f, "  {:<16} recorder failure: {}", "", failure)?;
                }
            }
        }

        if !self.skipped_regions.is_empty() {
            writeln!(f, "Skipped regions: {}", self.skipped_regions.join(", "))?;
        }

        if let Some(stream) = &self.stream {
            writeln!(
                f,
                "Stream: {} in {} {} {}",
                stream.stream_name,
                stream.region,
                stream.result,
                stream.arn.as_deref().unwrap_or("-")
            )?;
        }

        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use crate::orchestration::types::FailureKind;

    fn report() -> RunReport {
        let config = PipelineConfiguration::new(
            vec!["us-west-2".into(), "us-east-1".into()],
            "b1",
            "s1",
            WarehouseConfig::new("jdbc:redshift://h:5439/dev", "t", "u", "p4ss"),
        );
        let mut report = RunReport::new("run-1", &config);
        report.regions.push(RegionReport {
            region: "us-west-2".into(),
            recorder: ProvisioningStepResult::Created,
            channel: ProvisioningStepResult::Created,
        });
        report.regions.push(RegionReport {
            region: "us-east-1".into(),
            recorder: ProvisioningStepResult::failed(FailureKind::PermissionDenied, "denied"),
            channel: ProvisioningStepResult::Failed(StepFailure::dependency_failed(
                "recorder not active",
            )),
        });
        report
    }

    #[test]
    fn test_failed_regions_and_lookup() {
        let report = report();
        assert_eq!(report.home_region.as_deref(), Some("us-west-2"));
        let failed = report.failed_regions();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].region, "us-east-1");
        assert!(report.region("us-west-2").unwrap().succeeded());
    }

    #[test]
    fn test_into_result_maps_terminal_states() {
        let mut done = report();
        done.finish(RunState::Done, Vec::new());
        assert!(done.into_result().is_ok());

        let mut failed = report();
        failed.error = Some("stream rejected".into());
        failed.stream = Some(StreamReport::from_failure(
            "s1",
            "us-west-2",
            StepFailure::new(FailureKind::InvalidRequest, "stream rejected"),
        ));
        failed.finish(RunState::Failed, Vec::new());
        assert!(matches!(
            failed.into_result(),
            Err(PipelineError::StreamProvisioning { .. })
        ));

        let mut cancelled = report();
        cancelled.finish(RunState::Cancelled, Vec::new());
        assert!(matches!(
            cancelled.into_result(),
            Err(PipelineError::Cancelled {
                completed_regions: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_display_lists_every_region() {
        let rendered = report().to_string();
        assert!(rendered.contains("us-west-2"));
        assert!(rendered.contains("us-east-1"));
        assert!(rendered.contains("permission_denied"));
    }
}
