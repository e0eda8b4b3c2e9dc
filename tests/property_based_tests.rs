mod common;

use common::strategies::*;
use common::*;
use proptest::prelude::*;
use recorder_pipeline::providers::memory::Operation;
use recorder_pipeline::{ProvisioningStepResult, RunState};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: regions outside the failing subset always bind their channel
    #[test]
    fn failing_regions_never_affect_siblings(
        (regions, failing) in regions_with_failures_strategy(),
        code in recorder_failure_code_strategy(),
        concurrency in 1usize..4,
    ) {
        let report = runtime().block_on(async {
            let cloud = cloud();
            for (region, fails) in regions.iter().zip(&failing) {
                if *fails {
                    cloud.fail(Operation::PutRecorder, Some(*region), code, "injected");
                }
            }
            concurrent_orchestrator(&cloud, concurrency)
                .run(&pipeline(&regions))
                .await
        });

        prop_assert_eq!(report.regions.len(), regions.len());
        for ((region, fails), entry) in regions.iter().zip(&failing).zip(&report.regions) {
            prop_assert_eq!(entry.region.as_str(), *region);
            if *fails {
                prop_assert!(entry.recorder.is_failure());
                prop_assert!(entry.channel.is_failure());
            } else {
                prop_assert_eq!(&entry.recorder, &ProvisioningStepResult::Created);
                prop_assert_eq!(&entry.channel, &ProvisioningStepResult::Created);
            }
        }
        // The stream outcome is independent of region failures.
        prop_assert_eq!(report.final_state, RunState::Done);
    }

    /// Property: the stream step runs exactly once for any region list
    #[test]
    fn stream_provisioned_exactly_once(regions in region_list_strategy()) {
        let cloud = cloud();
        let report = runtime().block_on(orchestrator(&cloud).run(&pipeline(&regions)));

        prop_assert_eq!(cloud.calls_for(Operation::CreateDeliveryStream).len(), 1);
        prop_assert_eq!(report.home_region.as_deref(), Some(regions[0]));
        prop_assert_eq!(
            report.transitions.iter().filter(|t| t.to == RunState::ProvisioningStream).count(),
            1
        );
    }
}
