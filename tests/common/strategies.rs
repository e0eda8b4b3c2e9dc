use proptest::prelude::*;

pub const REGIONS: [&str; 6] = [
    "us-west-2",
    "us-east-1",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-2",
    "sa-east-1",
];

/// A non-empty ordered region list drawn from [`REGIONS`]
pub fn region_list_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(REGIONS.to_vec(), 1..=REGIONS.len())
}

/// A region list plus a mask marking which regions get a failing recorder
pub fn regions_with_failures_strategy() -> impl Strategy<Value = (Vec<&'static str>, Vec<bool>)> {
    region_list_strategy().prop_flat_map(|regions| {
        let len = regions.len();
        (Just(regions), prop::collection::vec(any::<bool>(), len))
    })
}

/// Provider error codes a recorder activation can fail with
pub fn recorder_failure_code_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("AccessDeniedException"),
        Just("MaxNumberOfConfigurationRecordersExceededException"),
        Just("InvalidRoleException"),
        Just("ThrottlingException"),
    ]
}
