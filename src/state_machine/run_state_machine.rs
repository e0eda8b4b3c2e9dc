use super::{
    errors::{StateMachineError, StateMachineResult},
    events::RunEvent,
    states::RunState,
};
use crate::logging::log_run_transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied transition, kept for the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RunState,
    pub to: RunState,
    pub event: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// In-memory state machine for one orchestrator run.
///
/// `ProvisioningRegions(i)` counts finalized regions, so the same machine
/// serves sequential and concurrent region scheduling: the run only moves to
/// `ProvisioningStream` after the last region reports in.
#[derive(Debug)]
pub struct RunStateMachine {
    run_id: String,
    region_count: usize,
    state: RunState,
    history: Vec<TransitionRecord>,
}

impl RunStateMachine {
    pub fn new(run_id: impl Into<String>, region_count: usize) -> Self {
        Self {
            run_id: run_id.into(),
            region_count,
            state: RunState::Init,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<TransitionRecord> {
        self.history
    }

    /// Attempt to apply `event` to the current state
    pub fn transition(&mut self, event: RunEvent) -> StateMachineResult<RunState> {
        let from = self.state;
        let to = self.determine_target_state(from, &event)?;

        let detail = match &event {
            RunEvent::RegionFinished(region) => Some(region.clone()),
            RunEvent::StreamProvisioned(arn) => Some(arn.clone()),
            other => other.error_message().map(str::to_string),
        };

        log_run_transition(
            &self.run_id,
            &from.to_string(),
            &to.to_string(),
            event.event_type(),
        );

        self.history.push(TransitionRecord {
            from,
            to,
            event: event.event_type().to_string(),
            detail,
            at: Utc::now(),
        });
        self.state = to;

        Ok(to)
    }

    fn determine_target_state(
        &self,
        current_state: RunState,
        event: &RunEvent,
    ) -> StateMachineResult<RunState> {
        if current_state.is_terminal() {
            return Err(StateMachineError::AlreadyTerminal(current_state.to_string()));
        }

        let target = match (current_state, event) {
            (RunState::Init, RunEvent::Start) => RunState::ProvisioningIdentities,
            (RunState::Init, RunEvent::Abort(_)) => RunState::Aborted,

            (RunState::ProvisioningIdentities, RunEvent::IdentitiesReady) => {
                if self.region_count == 0 {
                    RunState::ProvisioningStream
                } else {
                    RunState::ProvisioningRegions(0)
                }
            }
            (RunState::ProvisioningIdentities, RunEvent::Abort(_)) => RunState::Aborted,

            (RunState::ProvisioningRegions(done), RunEvent::RegionFinished(_)) => {
                if done + 1 < self.region_count {
                    RunState::ProvisioningRegions(done + 1)
                } else {
                    RunState::ProvisioningStream
                }
            }
            (RunState::ProvisioningRegions(_), RunEvent::Cancel) => RunState::Cancelled,

            (RunState::ProvisioningStream, RunEvent::StreamProvisioned(_)) => RunState::Done,
            (RunState::ProvisioningStream, RunEvent::StreamFailed(_)) => RunState::Failed,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_to_regions(sm: &mut RunStateMachine) {
        sm.transition(RunEvent::Start).unwrap();
        sm.transition(RunEvent::IdentitiesReady).unwrap();
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut sm = RunStateMachine::new("run-1", 2);
        drive_to_regions(&mut sm);
        assert_eq!(sm.current_state(), RunState::ProvisioningRegions(0));

        sm.transition(RunEvent::RegionFinished("us-west-2".into())).unwrap();
        assert_eq!(sm.current_state(), RunState::ProvisioningRegions(1));

        sm.transition(RunEvent::RegionFinished("us-east-1".into())).unwrap();
        assert_eq!(sm.current_state(), RunState::ProvisioningStream);

        sm.transition(RunEvent::StreamProvisioned("arn:stream".into()))
            .unwrap();
        assert_eq!(sm.current_state(), RunState::Done);
        assert_eq!(sm.history().len(), 5);
        assert_eq!(sm.history()[4].detail.as_deref(), Some("arn:stream"));
    }

    #[test]
    fn test_failed_only_reachable_from_stream() {
        let mut sm = RunStateMachine::new("run-1", 1);
        assert!(sm.transition(RunEvent::StreamFailed("x".into())).is_err());

        drive_to_regions(&mut sm);
        assert!(sm.transition(RunEvent::StreamFailed("x".into())).is_err());

        sm.transition(RunEvent::RegionFinished("us-west-2".into())).unwrap();
        assert_eq!(
            sm.transition(RunEvent::StreamFailed("boom".into())).unwrap(),
            RunState::Failed
        );
    }

    #[test]
    fn test_stream_cannot_start_before_last_region() {
        let mut sm = RunStateMachine::new("run-1", 3);
        drive_to_regions(&mut sm);
        sm.transition(RunEvent::RegionFinished("a".into())).unwrap();
        assert!(sm
            .transition(RunEvent::StreamProvisioned("arn".into()))
            .is_err());
        assert_eq!(sm.current_state(), RunState::ProvisioningRegions(1));
    }

    #[test]
    fn test_abort_and_cancel_paths() {
        let mut sm = RunStateMachine::new("run-1", 2);
        assert_eq!(
            sm.transition(RunEvent::Abort("bad config".into())).unwrap(),
            RunState::Aborted
        );

        let mut sm = RunStateMachine::new("run-2", 2);
        sm.transition(RunEvent::Start).unwrap();
        assert_eq!(
            sm.transition(RunEvent::Abort("role".into())).unwrap(),
            RunState::Aborted
        );

        let mut sm = RunStateMachine::new("run-3", 2);
        drive_to_regions(&mut sm);
        assert_eq!(sm.transition(RunEvent::Cancel).unwrap(), RunState::Cancelled);
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let mut sm = RunStateMachine::new("run-1", 1);
        sm.transition(RunEvent::Abort("x".into())).unwrap();
        assert_eq!(
            sm.transition(RunEvent::Start),
            Err(StateMachineError::AlreadyTerminal("aborted".into()))
        );
    }

    #[test]
    fn test_cancel_not_allowed_during_stream() {
        let mut sm = RunStateMachine::new("run-1", 1);
        drive_to_regions(&mut sm);
        sm.transition(RunEvent::RegionFinished("a".into())).unwrap();
        assert!(sm.transition(RunEvent::Cancel).is_err());
    }
}
