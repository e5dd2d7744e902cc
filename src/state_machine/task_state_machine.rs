use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    errors::{StateMachineResult, StateTransitionError},
    events::TaskEvent,
    states::TaskStatus,
};

/// One accepted transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub event: &'static str,
    pub at: DateTime<Utc>,
}

/// In-memory lifecycle tracker for a single task attempt
///
/// Owned by the task processing it; never shared across deliveries. A
/// redelivered task starts a fresh machine in `PENDING`.
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    task_id: String,
    current: TaskStatus,
    history: Vec<TransitionRecord>,
}

impl TaskStateMachine {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            current: TaskStatus::Pending,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> TaskStatus {
        self.current
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Attempt to transition the task state
    pub fn transition(&mut self, event: TaskEvent) -> StateMachineResult<TaskStatus> {
        let target = self.determine_target_state(&event)?;

        debug!(
            task_id = %self.task_id,
            from = %self.current,
            to = %target,
            event = event.event_type(),
            "Task state transition"
        );

        self.history.push(TransitionRecord {
            from: self.current,
            to: target,
            event: event.event_type(),
            at: Utc::now(),
        });
        self.current = target;
        Ok(target)
    }

    fn determine_target_state(&self, event: &TaskEvent) -> StateMachineResult<TaskStatus> {
        if self.current.is_terminal() {
            return Err(StateTransitionError::AlreadyTerminal {
                task_id: self.task_id.clone(),
                state: self.current,
            });
        }

        let target = match (self.current, event) {
            (TaskStatus::Pending, TaskEvent::Dequeue) => TaskStatus::Processing,
            (TaskStatus::Processing, TaskEvent::Succeed) => TaskStatus::Completed,
            (TaskStatus::Processing, TaskEvent::ScheduleRetry { .. }) => TaskStatus::RetryScheduled,
            (TaskStatus::Processing, TaskEvent::Fail(_)) => TaskStatus::Failed,
            (TaskStatus::RetryScheduled, TaskEvent::Requeue) => TaskStatus::Pending,
            (from, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    task_id: self.task_id.clone(),
                    from,
                    event: event.event_type(),
                })
            }
        };

        Ok(target)
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path() {
        let mut machine = TaskStateMachine::new("task-1");
        assert_eq!(machine.transition(TaskEvent::Dequeue).unwrap(), TaskStatus::Processing);
        assert_eq!(machine.transition(TaskEvent::Succeed).unwrap(), TaskStatus::Completed);
        assert!(machine.is_terminal());
        assert_eq!(machine.history().len(), 2);
    }

    #[test]
    fn test_retry_cycle_reenters_pending() {
        let mut machine = TaskStateMachine::new("task-2");
        machine.transition(TaskEvent::Dequeue).unwrap();
        machine
            .transition(TaskEvent::ScheduleRetry { delay_ms: 1000 })
            .unwrap();
        assert_eq!(machine.transition(TaskEvent::Requeue).unwrap(), TaskStatus::Pending);
        assert_eq!(machine.transition(TaskEvent::Dequeue).unwrap(), TaskStatus::Processing);
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let mut machine = TaskStateMachine::new("task-3");
        machine.transition(TaskEvent::Dequeue).unwrap();
        machine.transition(TaskEvent::Fail("boom".into())).unwrap();

        let err = machine.transition(TaskEvent::Dequeue).unwrap_err();
        assert!(matches!(err, StateTransitionError::AlreadyTerminal { .. }));
    }

    #[test]
    fn test_invalid_transition() {
        let mut machine = TaskStateMachine::new("task-4");
        let err = machine.transition(TaskEvent::Succeed).unwrap_err();
        assert_eq!(
            err,
            StateTransitionError::InvalidTransition {
                task_id: "task-4".to_string(),
                from: TaskStatus::Pending,
                event: "succeed",
            }
        );
    }
}
