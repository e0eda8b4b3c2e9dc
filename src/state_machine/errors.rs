use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Run is already in terminal state {0}")]
    AlreadyTerminal(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
