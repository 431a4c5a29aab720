//! Execution state reconstructed from workflow history.
//!
//! A [`WorkflowExecutionState`] is the root of a homogeneous tree: its
//! `child_states` hold activities, timers and nested workflows in the order
//! they first appeared in the history. Events are folded in one at a time
//! through [`ExecutionState::update`].

pub mod activity;
pub mod timer;
pub mod workflow;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::history::{Failure, HistoryEvent, RetryState};

pub use activity::{ActivityExecutionState, ActivityExecutionStatus};
pub use timer::{TimerExecutionState, TimerExecutionStatus};
pub use workflow::{WorkflowExecutionState, WorkflowExecutionStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error(
        "event {event_id}: child workflow started for initiated event {initiated_event_id}, which was never recorded"
    )]
    UnknownChildWorkflow { event_id: i64, initiated_event_id: i64 },
}

/// Common view over workflows, activities and timers
pub trait ExecutionState {
    /// Fold a single history event into this state
    fn update(&mut self, event: &HistoryEvent) -> Result<(), StateError>;
    fn name(&self) -> String;
    fn attempt(&self) -> i32;
    fn failure(&self) -> Option<&Failure>;
    fn retry_state(&self) -> RetryState;
    fn start_time(&self) -> Option<DateTime<Utc>>;
    /// `None` unless both start and close time are known
    fn duration(&self) -> Option<Duration>;
}

/// An entry in a workflow's `child_states`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChildState {
    Activity(ActivityExecutionState),
    Timer(TimerExecutionState),
    Workflow(WorkflowExecutionState),
}

impl ChildState {
    pub fn as_workflow(&self) -> Option<&WorkflowExecutionState> {
        match self {
            ChildState::Workflow(wf) => Some(wf),
            _ => None,
        }
    }

    pub fn as_workflow_mut(&mut self) -> Option<&mut WorkflowExecutionState> {
        match self {
            ChildState::Workflow(wf) => Some(wf),
            _ => None,
        }
    }

    fn as_state(&self) -> &dyn ExecutionState {
        match self {
            ChildState::Activity(a) => a,
            ChildState::Timer(t) => t,
            ChildState::Workflow(w) => w,
        }
    }
}

impl ExecutionState for ChildState {
    fn update(&mut self, event: &HistoryEvent) -> Result<(), StateError> {
        match self {
            ChildState::Activity(a) => a.update(event),
            ChildState::Timer(t) => t.update(event),
            ChildState::Workflow(w) => w.update(event),
        }
    }

    fn name(&self) -> String {
        self.as_state().name()
    }

    fn attempt(&self) -> i32 {
        self.as_state().attempt()
    }

    fn failure(&self) -> Option<&Failure> {
        match self {
            ChildState::Activity(a) => a.failure(),
            ChildState::Timer(t) => t.failure(),
            ChildState::Workflow(w) => w.failure(),
        }
    }

    fn retry_state(&self) -> RetryState {
        self.as_state().retry_state()
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.as_state().start_time()
    }

    fn duration(&self) -> Option<Duration> {
        self.as_state().duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn test_child_state_delegates() {
        let mut timer = ChildState::Timer(TimerExecutionState::default());
        timer.update(&timer_started(5, "5", 30)).unwrap();
        assert_eq!(timer.name(), "Timer (30s)");
        assert_eq!(timer.attempt(), 1);
        assert!(timer.failure().is_none());
        assert!(timer.as_workflow().is_none());

        let mut wf = ChildState::Workflow(WorkflowExecutionState::new("child", ""));
        wf.update(&workflow_started(1, "ChildWorkflow")).unwrap();
        assert_eq!(wf.name(), "ChildWorkflow");
        assert!(wf.as_workflow().is_some());
        assert!(wf.start_time().is_some());
        assert!(wf.duration().is_none());
    }

    #[test]
    fn test_child_state_serializes_with_kind_tag() {
        let child = ChildState::Activity(ActivityExecutionState::default());
        let json = serde_json::to_value(&child).unwrap();
        assert_eq!(json["kind"], "activity");
    }
}
