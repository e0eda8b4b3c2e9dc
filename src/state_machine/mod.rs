// State machine module for provisioning runs
//
// A run moves Init -> ProvisioningIdentities -> ProvisioningRegions(i) ->
// ProvisioningStream -> Done, with explicit terminal states for the failure,
// abort and cancellation paths.

pub mod errors;
pub mod events;
pub mod run_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::RunEvent;
pub use run_state_machine::{RunStateMachine, TransitionRecord};
pub use states::RunState;
