//! # In-Memory Cloud Backend
//!
//! A deterministic stand-in for the real provider services. It keeps the
//! resources of one simulated account, enforces the same preconditions the
//! real services do (roles before policy attachment, recorders before start
//! and before channels), journals every call in order, and supports fault
//! injection per operation and region. Dry runs and the test-suite use it.

use super::{
    AccountResolver, DeliveryChannelDefinition, DeliveryChannelService, DeliveryStreamDefinition,
    DeliveryStreamService, IdentityService, ProviderError, ProviderResult, RecorderDefinition,
    RecorderService, RecorderStatus,
};
use crate::constants::DEFAULT_PARTITION;
use crate::orchestration::types::AccountContext;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Provider operations the backend journals and can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ResolveAccount,
    CreateRole,
    AttachRolePolicy,
    DescribeRecorder,
    PutRecorder,
    StartRecorder,
    DescribeChannel,
    PutChannel,
    CreateDeliveryStream,
    DescribeDeliveryStream,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveAccount => "GetCallerIdentity",
            Self::CreateRole => "CreateRole",
            Self::AttachRolePolicy => "AttachRolePolicy",
            Self::DescribeRecorder => "DescribeConfigurationRecorders",
            Self::PutRecorder => "PutConfigurationRecorder",
            Self::StartRecorder => "StartConfigurationRecorder",
            Self::DescribeChannel => "DescribeDeliveryChannels",
            Self::PutChannel => "PutDeliveryChannel",
            Self::CreateDeliveryStream => "CreateDeliveryStream",
            Self::DescribeDeliveryStream => "DescribeDeliveryStream",
        };
        f.write_str(name)
    }
}

/// One journaled provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub sequence: u64,
    pub operation: Operation,
    pub region: Option<String>,
    pub target: String,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    region: Option<String>,
    code: String,
    message: String,
    remaining: Option<u32>,
}

#[derive(Debug, Clone)]
struct RoleRecord {
    trust_policy_document: String,
    attached_policies: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct StreamRecord {
    arn: String,
    definition: DeliveryStreamDefinition,
}

/// Simulated single-account cloud
pub struct InMemoryCloud {
    account: AccountContext,
    latency: Option<Duration>,
    roles: DashMap<String, RoleRecord>,
    recorders: DashMap<String, RecorderStatus>,
    channels: DashMap<String, DeliveryChannelDefinition>,
    streams: DashMap<(String, String), StreamRecord>,
    faults: Mutex<Vec<Fault>>,
    journal: Mutex<Vec<ProviderCall>>,
    sequence: AtomicU64,
}

impl InMemoryCloud {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account: AccountContext::new(account_id, DEFAULT_PARTITION),
            latency: None,
            roles: DashMap::new(),
            recorders: DashMap::new(),
            channels: DashMap::new(),
            streams: DashMap::new(),
            faults: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Delay every call, so concurrent schedules actually interleave
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every matching call with `code` until faults are cleared.
    /// `region: None` matches calls in any region (and global calls).
    pub fn fail(&self, operation: Operation, region: Option<&str>, code: &str, message: &str) {
        self.push_fault(operation, region, code, message, None);
    }

    /// Fail only the next matching call
    pub fn fail_once(&self, operation: Operation, region: Option<&str>, code: &str, message: &str) {
        self.push_fault(operation, region, code, message, Some(1));
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.journal.lock().clone()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<ProviderCall> {
        self.journal
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    pub fn reset_journal(&self) {
        self.journal.lock().clear();
    }

    pub fn has_role(&self, role_name: &str) -> bool {
        self.roles.contains_key(role_name)
    }

    pub fn role_policies(&self, role_name: &str) -> Vec<String> {
        self.roles
            .get(role_name)
            .map(|role| role.attached_policies.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn role_trust_policy(&self, role_name: &str) -> Option<String> {
        self.roles
            .get(role_name)
            .map(|role| role.trust_policy_document.clone())
    }

    pub fn recorder(&self, region: &str) -> Option<RecorderStatus> {
        self.recorders.get(region).map(|entry| entry.value().clone())
    }

    pub fn channel(&self, region: &str) -> Option<DeliveryChannelDefinition> {
        self.channels.get(region).map(|entry| entry.value().clone())
    }

    pub fn stream(&self, region: &str, name: &str) -> Option<DeliveryStreamDefinition> {
        self.streams
            .get(&(region.to_string(), name.to_string()))
            .map(|entry| entry.definition.clone())
    }

    /// Number of resources of every kind held by the account
    pub fn resource_count(&self) -> usize {
        self.roles.len() + self.recorders.len() + self.channels.len() + self.streams.len()
    }

    fn push_fault(
        &self,
        operation: Operation,
        region: Option<&str>,
        code: &str,
        message: &str,
        remaining: Option<u32>,
    ) {
        self.faults.lock().push(Fault {
            operation,
            region: region.map(str::to_string),
            code: code.to_string(),
            message: message.to_string(),
            remaining,
        });
    }

    /// Journal the call, wait out simulated latency, then apply faults
    async fn enter(
        &self,
        operation: Operation,
        region: Option<&str>,
        target: &str,
    ) -> ProviderResult<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(ProviderCall {
            sequence,
            operation,
            region: region.map(str::to_string),
            target: target.to_string(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.lock();
        let matched = faults.iter().position(|fault| {
            fault.operation == operation
                && (fault.region.is_none() || fault.region.as_deref() == region)
        });

        if let Some(index) = matched {
            let fault = faults[index].clone();
            if let Some(remaining) = faults[index].remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    faults.remove(index);
                }
            }
            return Err(ProviderError::from_code(
                operation.to_string(),
                fault.code,
                fault.message,
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for InMemoryCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCloud")
            .field("account", &self.account)
            .field("roles", &self.roles.len())
            .field("recorders", &self.recorders.len())
            .field("channels", &self.channels.len())
            .field("streams", &self.streams.len())
            .finish()
    }
}

#[async_trait]
impl AccountResolver for InMemoryCloud {
    async fn resolve_account(&self) -> ProviderResult<AccountContext> {
        self.enter(Operation::ResolveAccount, None, self.account.account_id())
            .await?;
        Ok(self.account.clone())
    }
}

#[async_trait]
impl IdentityService for InMemoryCloud {
    async fn create_role(
        &self,
        role_name: &str,
        trust_policy_document: &str,
    ) -> ProviderResult<()> {
        self.enter(Operation::CreateRole, None, role_name).await?;

        if self.roles.contains_key(role_name) {
            return Err(ProviderError::from_code(
                Operation::CreateRole.to_string(),
                "EntityAlreadyExists",
                format!("Role with name {role_name} already exists."),
            ));
        }

        if serde_json::from_str::<serde_json::Value>(trust_policy_document).is_err() {
            return Err(ProviderError::from_code(
                Operation::CreateRole.to_string(),
                "MalformedPolicyDocument",
                "trust policy is not valid JSON",
            ));
        }

        self.roles.insert(
            role_name.to_string(),
            RoleRecord {
                trust_policy_document: trust_policy_document.to_string(),
                attached_policies: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ProviderResult<()> {
        self.enter(Operation::AttachRolePolicy, None, role_name)
            .await?;

        match self.roles.get_mut(role_name) {
            Some(mut role) => {
                role.attached_policies.insert(policy_arn.to_string());
                Ok(())
            }
            None => Err(ProviderError::from_code(
                Operation::AttachRolePolicy.to_string(),
                "NoSuchEntity",
                format!("The role with name {role_name} cannot be found."),
            )),
        }
    }
}

#[async_trait]
impl RecorderService for InMemoryCloud {
    async fn describe_recorder(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<RecorderStatus>> {
        self.enter(Operation::DescribeRecorder, Some(region), name)
            .await?;
        Ok(self
            .recorders
            .get(region)
            .filter(|status| status.definition.name == name)
            .map(|status| status.value().clone()))
    }

    async fn put_recorder(
        &self,
        region: &str,
        recorder: &RecorderDefinition,
    ) -> ProviderResult<()> {
        self.enter(Operation::PutRecorder, Some(region), &recorder.name)
            .await?;

        let role_name = recorder.role_arn.rsplit('/').next().unwrap_or_default();
        if !self.roles.contains_key(role_name) {
            return Err(ProviderError::from_code(
                Operation::PutRecorder.to_string(),
                "InvalidRoleException",
                format!("Cannot assume role {}", recorder.role_arn),
            ));
        }

        let mut entry = self
            .recorders
            .entry(region.to_string())
            .or_insert_with(|| RecorderStatus {
                definition: recorder.clone(),
                recording: false,
            });

        // One recorder per region; redeclaring under the same name replaces it.
        if entry.definition.name != recorder.name {
            return Err(ProviderError::from_code(
                Operation::PutRecorder.to_string(),
                "MaxNumberOfConfigurationRecordersExceededException",
                format!("Region {region} already has recorder {}", entry.definition.name),
            ));
        }
        entry.definition = recorder.clone();
        Ok(())
    }

    async fn start_recorder(&self, region: &str, name: &str) -> ProviderResult<()> {
        self.enter(Operation::StartRecorder, Some(region), name)
            .await?;

        match self.recorders.get_mut(region) {
            Some(mut status) if status.definition.name == name => {
                status.recording = true;
                Ok(())
            }
            _ => Err(ProviderError::from_code(
                Operation::StartRecorder.to_string(),
                "NoSuchConfigurationRecorderException",
                format!("Cannot find configuration recorder {name} in {region}"),
            )),
        }
    }
}

#[async_trait]
impl DeliveryChannelService for InMemoryCloud {
    async fn describe_channel(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<DeliveryChannelDefinition>> {
        self.enter(Operation::DescribeChannel, Some(region), name)
            .await?;
        Ok(self
            .channels
            .get(region)
            .filter(|channel| channel.name == name)
            .map(|channel| channel.value().clone()))
    }

    async fn put_channel(
        &self,
        region: &str,
        channel: &DeliveryChannelDefinition,
    ) -> ProviderResult<()> {
        self.enter(Operation::PutChannel, Some(region), &channel.name)
            .await?;

        if !self.recorders.contains_key(region) {
            return Err(ProviderError::from_code(
                Operation::PutChannel.to_string(),
                "NoAvailableConfigurationRecorderException",
                format!("No configuration recorder exists in {region}"),
            ));
        }

        let bucket = &channel.s3_bucket_name;
        if bucket
            .chars()
            .any(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'))
        {
            return Err(ProviderError::from_code(
                Operation::PutChannel.to_string(),
                "NoSuchBucketException",
                format!("The specified bucket {bucket} does not exist"),
            ));
        }

        self.channels.insert(region.to_string(), channel.clone());
        Ok(())
    }
}

#[async_trait]
impl DeliveryStreamService for InMemoryCloud {
    async fn create_delivery_stream(
        &self,
        region: &str,
        stream: &DeliveryStreamDefinition,
    ) -> ProviderResult<String> {
        self.enter(Operation::CreateDeliveryStream, Some(region), &stream.name)
            .await?;

        let key = (region.to_string(), stream.name.clone());
        if self.streams.contains_key(&key) {
            return Err(ProviderError::from_code(
                Operation::CreateDeliveryStream.to_string(),
                "ResourceInUseException",
                format!("Delivery stream {} already exists", stream.name),
            ));
        }

        let arn = self.account.delivery_stream_arn(region, &stream.name);
        self.streams.insert(
            key,
            StreamRecord {
                arn: arn.clone(),
                definition: stream.clone(),
            },
        );
        Ok(arn)
    }

    async fn describe_delivery_stream(
        &self,
        region: &str,
        name: &str,
    ) -> ProviderResult<Option<String>> {
        self.enter(Operation::DescribeDeliveryStream, Some(region), name)
            .await?;
        Ok(self
            .streams
            .get(&(region.to_string(), name.to_string()))
            .map(|record| record.arn.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_role_lifecycle() {
        let cloud = InMemoryCloud::new("111122223333");
        cloud.create_role("r1", "{}").await.unwrap();

        let err = cloud.create_role("r1", "{}").await.unwrap_err();
        assert!(err.is_already_exists());

        cloud.attach_role_policy("r1", "arn:aws:iam::aws:policy/p").await.unwrap();
        assert_eq!(cloud.role_policies("r1"), vec!["arn:aws:iam::aws:policy/p"]);

        let err = cloud.attach_role_policy("missing", "p").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_channel_requires_recorder() {
        let cloud = InMemoryCloud::new("111122223333");
        let channel = DeliveryChannelDefinition {
            name: "default".into(),
            s3_bucket_name: "b1".into(),
            streaming_destination_arn: "arn:aws:kinesis::111122223333:stream/s1".into(),
            snapshot_delivery_frequency: "One_Hour".into(),
        };
        let err = cloud.put_channel("us-west-2", &channel).await.unwrap_err();
        assert_eq!(err.code, "NoAvailableConfigurationRecorderException");
    }

    #[tokio::test]
    async fn test_fault_injection_once_and_persistent() {
        let cloud = InMemoryCloud::new("111122223333");
        cloud.fail_once(Operation::CreateRole, None, "ThrottlingException", "slow");

        assert!(cloud.create_role("r1", "{}").await.unwrap_err().is_transient());
        assert!(cloud.create_role("r1", "{}").await.is_ok());

        cloud.fail(
            Operation::StartRecorder,
            Some("us-east-1"),
            "AccessDeniedException",
            "denied",
        );
        for _ in 0..2 {
            let err = cloud.start_recorder("us-east-1", "default").await.unwrap_err();
            assert_eq!(err.code, "AccessDeniedException");
        }
        // Other regions are unaffected by a region-scoped fault.
        let err = cloud.start_recorder("us-west-2", "default").await.unwrap_err();
        assert_eq!(err.code, "NoSuchConfigurationRecorderException");

        assert_eq!(cloud.calls_for(Operation::CreateRole).len(), 2);
    }

    #[tokio::test]
    async fn test_second_recorder_name_hits_limit() {
        let cloud = InMemoryCloud::new("111122223333");
        cloud.create_role("AWSConfigRole", "{}").await.unwrap();
        let role_arn = "arn:aws:iam::111122223333:role/AWSConfigRole";

        cloud
            .put_recorder("us-west-2", &RecorderDefinition::full_coverage("default", role_arn))
            .await
            .unwrap();
        let err = cloud
            .put_recorder("us-west-2", &RecorderDefinition::full_coverage("other", role_arn))
            .await
            .unwrap_err();
        assert_eq!(err.code, "MaxNumberOfConfigurationRecordersExceededException");
    }
}
