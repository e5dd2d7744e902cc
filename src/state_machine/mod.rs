// State machine module for the task lifecycle
//
// Tracks one task through PENDING -> PROCESSING -> {COMPLETED | RETRY_SCHEDULED | FAILED}
// and rejects any transition outside that graph before the orchestrator acts on it.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

pub use errors::{StateMachineResult, StateTransitionError};
pub use events::TaskEvent;
pub use states::TaskStatus;
pub use task_state_machine::{TaskStateMachine, TransitionRecord};
