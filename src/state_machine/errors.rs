use thiserror::Error;

use super::states::TaskStatus;

/// Rejected lifecycle transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("Invalid transition for task {task_id}: {from} --{event}--> ?")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        event: &'static str,
    },

    #[error("Task {task_id} already reached terminal state {state}")]
    AlreadyTerminal { task_id: String, state: TaskStatus },
}

pub type StateMachineResult<T> = Result<T, StateTransitionError>;
