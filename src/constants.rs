//! # System Constants
//!
//! Fixed resource names, service principals, and delivery settings that define
//! the shape of the provisioned pipeline. Role names and managed policies can
//! be overridden through configuration; everything else here is a design
//! constant.

/// Name shared by the configuration recorder and delivery channel in every region
pub const DEFAULT_RECORDER_NAME: &str = "default";
pub const DEFAULT_CHANNEL_NAME: &str = "default";

/// Default partition used when the account resolver cannot report one
pub const DEFAULT_PARTITION: &str = "aws";

/// Identity roles and their trust principals
pub mod identity {
    pub const RECORDER_ROLE_NAME: &str = "AWSConfigRole";
    pub const RECORDER_SERVICE_PRINCIPAL: &str = "config.amazonaws.com";
    pub const RECORDER_MANAGED_POLICY_ARN: &str =
        "arn:aws:iam::aws:policy/service-role/AWSConfigRole";

    pub const DELIVERY_ROLE_NAME: &str = "FirehoseDeliveryRole";
    pub const DELIVERY_SERVICE_PRINCIPAL: &str = "firehose.amazonaws.com";
    pub const DELIVERY_MANAGED_POLICY_ARN: &str =
        "arn:aws:iam::aws:policy/service-role/AWSConfigRoleForOrganizations";

    pub const TRUST_POLICY_VERSION: &str = "2012-10-17";
    pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

    /// Maximum role name length accepted by the identity service
    pub const MAX_ROLE_NAME_LENGTH: usize = 64;
}

/// Delivery channel and load stream settings
pub mod delivery {
    /// Periodic snapshot delivery frequency for every delivery channel
    pub const SNAPSHOT_DELIVERY_FREQUENCY: &str = "One_Hour";

    /// Copy format directive for the warehouse load (auto-detected JSON)
    pub const COPY_OPTIONS: &str = "JSON 'auto'";

    /// Intermediate staging settings for the load stream
    pub const STAGING_PREFIX: &str = "firehose/";
    pub const STAGING_BUFFER_INTERVAL_SECONDS: i32 = 300;
    pub const STAGING_BUFFER_SIZE_MIB: i32 = 5;
    pub const STAGING_COMPRESSION: &str = "UNCOMPRESSED";
}

/// Columns of the externally created warehouse table the stream loads into
pub const WAREHOUSE_TABLE_COLUMNS: [&str; 6] = [
    "resource_id",
    "resource_type",
    "region",
    "configuration",
    "tags",
    "capture_time",
];

/// Lifecycle event names emitted in structured logs
pub mod events {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_TRANSITION: &str = "run.transition";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_ABORTED: &str = "run.aborted";
    pub const RUN_CANCELLED: &str = "run.cancelled";

    pub const IDENTITY_ENSURED: &str = "identity.ensured";
    pub const RECORDER_ACTIVATED: &str = "region.recorder_activated";
    pub const CHANNEL_BOUND: &str = "region.channel_bound";
    pub const REGION_FINISHED: &str = "region.finished";
    pub const STREAM_PROVISIONED: &str = "stream.provisioned";
}
