use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{
    ActivityExecutionState, ChildState, ExecutionState, StateError, TimerExecutionState,
};
use crate::history::{
    EventAttributes, Failure, HistoryEvent, RetryState, WorkflowExecution,
    WorkflowExecutionCancelRequestedAttributes, WorkflowExecutionStartedAttributes,
    WorkflowExecutionTerminatedAttributes,
};

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowExecutionStatus {
    #[default]
    Unspecified,
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

impl WorkflowExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            WorkflowExecutionStatus::Unspecified | WorkflowExecutionStatus::Running
        )
    }
}

/// Lookup from originating event id to position in `child_states`.
/// Always compares equal so structural equality ignores it.
#[derive(Debug, Clone, Default)]
struct ChildIndex {
    activities: HashMap<i64, usize>,
    child_workflows: HashMap<i64, usize>,
    timers: HashMap<i64, usize>,
}

impl PartialEq for ChildIndex {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// State of one workflow run and everything it spawned
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct WorkflowExecutionState {
    pub execution: WorkflowExecution,
    pub workflow_type: String,
    pub status: WorkflowExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    /// Id of the last event folded into this node's own history
    pub last_event_id: i64,
    /// History length reported when the node was described
    pub history_length: i64,
    pub is_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<WorkflowExecutionTerminatedAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_request: Option<WorkflowExecutionCancelRequestedAttributes>,
    pub retry_state: RetryState,
    #[serde(with = "crate::duration::secs", skip_serializing_if = "Option::is_none")]
    pub workflow_execution_timeout: Option<Duration>,
    pub attempt: i32,
    /// 0 when the workflow has no retry policy
    pub maximum_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution: Option<WorkflowExecution>,
    pub child_states: Vec<ChildState>,
    #[serde(skip)]
    index: ChildIndex,
    /// Closed by the parent's child event, not yet by this node's own history
    #[serde(skip)]
    closed_by_parent: bool,
}

impl WorkflowExecutionState {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            execution: WorkflowExecution::new(workflow_id, run_id),
            ..Self::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Caught up with the history length reported at describe time
    pub fn is_up_to_date(&self) -> bool {
        self.last_event_id >= self.history_length
    }

    /// `(processed, total)` event counts summed over this node and all child workflows
    pub fn number_of_events(&self) -> (i64, i64) {
        let mut current = self.last_event_id;
        let mut total = self.history_length;
        for child in self.child_states.iter().filter_map(ChildState::as_workflow) {
            let (c, t) = child.number_of_events();
            current += c;
            total += t;
        }
        (current, total)
    }

    /// Position in `child_states` of the child workflow created by `initiated_event_id`
    pub fn child_workflow_position(&self, initiated_event_id: i64) -> Option<usize> {
        self.index.child_workflows.get(&initiated_event_id).copied()
    }

    /// Follow a path of `child_states` positions down to a nested workflow.
    /// The empty path is this node.
    pub fn workflow_at(&self, path: &[usize]) -> Option<&WorkflowExecutionState> {
        let mut node = self;
        for &pos in path {
            node = node.child_states.get(pos)?.as_workflow()?;
        }
        Some(node)
    }

    pub fn workflow_at_mut(&mut self, path: &[usize]) -> Option<&mut WorkflowExecutionState> {
        let mut node = self;
        for &pos in path {
            node = node.child_states.get_mut(pos)?.as_workflow_mut()?;
        }
        Some(node)
    }

    pub fn child_workflows(&self) -> impl Iterator<Item = &WorkflowExecutionState> {
        self.child_states.iter().filter_map(ChildState::as_workflow)
    }

    /// Apply a terminal event from this node's own history. Returns false if
    /// the history already closed the workflow. A close seen only from the
    /// parent is replaced.
    fn close(&mut self, status: WorkflowExecutionStatus, time: Option<DateTime<Utc>>) -> bool {
        if self.status.is_terminal() && !self.closed_by_parent {
            return false;
        }
        self.status = status;
        if time.is_some() {
            self.close_time = time;
        }
        self.closed_by_parent = false;
        true
    }

    /// Apply a child close event from the parent's history
    fn observe_close(&mut self, status: WorkflowExecutionStatus, time: Option<DateTime<Utc>>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if self.close_time.is_none() {
            self.close_time = time;
        }
        self.closed_by_parent = true;
        true
    }

    fn apply_started(&mut self, event: &HistoryEvent, attrs: &WorkflowExecutionStartedAttributes) {
        // Details of a close already observed stay until this history closes
        if !self.status.is_terminal() {
            self.status = WorkflowExecutionStatus::Running;
            self.failure = None;
            self.cancel_request = None;
            self.termination = None;
        }
        if event.event_time.is_some() {
            self.start_time = event.event_time;
        }
        if self.execution.run_id.is_empty() && !attrs.original_execution_run_id.is_empty() {
            self.execution.run_id = attrs.original_execution_run_id.clone();
        }
        self.workflow_type = attrs.workflow_type.clone();
        self.attempt = attrs.attempt;
        self.workflow_execution_timeout = attrs.workflow_execution_timeout;
        self.maximum_attempts = attrs.retry_policy.as_ref().map_or(0, |p| p.maximum_attempts);
        if let Some(parent) = &attrs.parent_workflow_execution {
            self.parent_execution = Some(parent.clone());
        }
    }

    fn push_child(&mut self, child: ChildState) -> usize {
        self.child_states.push(child);
        self.child_states.len() - 1
    }

    fn route(&mut self, position: Option<usize>, event: &HistoryEvent) -> Result<(), StateError> {
        match position.and_then(|pos| self.child_states.get_mut(pos)) {
            Some(child) => child.update(event),
            None => Ok(()),
        }
    }

    fn child_workflow_mut(&mut self, initiated_event_id: i64) -> Option<&mut WorkflowExecutionState> {
        let pos = self.child_workflow_position(initiated_event_id)?;
        self.child_states.get_mut(pos)?.as_workflow_mut()
    }
}

impl ExecutionState for WorkflowExecutionState {
    fn update(&mut self, event: &HistoryEvent) -> Result<(), StateError> {
        self.last_event_id = self.last_event_id.max(event.event_id);
        let time = event.event_time;

        match &event.attributes {
            EventAttributes::WorkflowExecutionStarted(attrs) => self.apply_started(event, attrs),
            EventAttributes::WorkflowExecutionCompleted => {
                self.close(WorkflowExecutionStatus::Completed, time);
            }
            EventAttributes::WorkflowExecutionFailed(attrs) => {
                if self.close(WorkflowExecutionStatus::Failed, time) {
                    self.failure = attrs.failure.clone();
                    self.retry_state = attrs.retry_state;
                }
            }
            EventAttributes::WorkflowExecutionTerminated(attrs) => {
                if self.close(WorkflowExecutionStatus::Terminated, time) {
                    self.termination = Some(attrs.clone());
                }
            }
            EventAttributes::WorkflowExecutionCancelRequested(attrs) => {
                self.cancel_request = Some(attrs.clone());
            }
            EventAttributes::WorkflowExecutionCanceled => {
                self.close(WorkflowExecutionStatus::Canceled, time);
            }
            EventAttributes::WorkflowExecutionContinuedAsNew(_) => {
                self.close(WorkflowExecutionStatus::ContinuedAsNew, time);
            }
            EventAttributes::WorkflowExecutionTimedOut(attrs) => {
                if self.close(WorkflowExecutionStatus::TimedOut, time) {
                    self.retry_state = attrs.retry_state;
                }
            }

            EventAttributes::ActivityTaskScheduled(_) => {
                let mut activity = ActivityExecutionState::default();
                activity.update(event)?;
                let pos = self.push_child(ChildState::Activity(activity));
                self.index.activities.insert(event.event_id, pos);
            }
            EventAttributes::ActivityTaskStarted(attrs) => {
                let pos = self.index.activities.get(&attrs.scheduled_event_id).copied();
                self.route(pos, event)?;
            }
            EventAttributes::ActivityTaskCompleted(attrs)
            | EventAttributes::ActivityTaskCancelRequested(attrs)
            | EventAttributes::ActivityTaskCanceled(attrs) => {
                let pos = self.index.activities.get(&attrs.scheduled_event_id).copied();
                self.route(pos, event)?;
            }
            EventAttributes::ActivityTaskFailed(attrs) | EventAttributes::ActivityTaskTimedOut(attrs) => {
                let pos = self.index.activities.get(&attrs.scheduled_event_id).copied();
                self.route(pos, event)?;
            }

            EventAttributes::StartChildWorkflowExecutionInitiated(attrs) => {
                let mut child = WorkflowExecutionState::new(attrs.workflow_id.clone(), "");
                child.workflow_type = attrs.workflow_type.clone();
                child.parent_execution = Some(self.execution.clone());
                let pos = self.push_child(ChildState::Workflow(child));
                self.index.child_workflows.insert(event.event_id, pos);
            }
            EventAttributes::ChildWorkflowExecutionStarted(attrs) => {
                let child = self.child_workflow_mut(attrs.initiated_event_id).ok_or(
                    StateError::UnknownChildWorkflow {
                        event_id: event.event_id,
                        initiated_event_id: attrs.initiated_event_id,
                    },
                )?;
                child.execution = attrs.workflow_execution.clone();
                if !child.status.is_terminal() {
                    child.status = WorkflowExecutionStatus::Running;
                }
                if child.start_time.is_none() {
                    child.start_time = time;
                }
            }
            EventAttributes::ChildWorkflowExecutionCompleted(attrs) => {
                if let Some(child) = self.child_workflow_mut(attrs.initiated_event_id) {
                    child.observe_close(WorkflowExecutionStatus::Completed, time);
                }
            }
            EventAttributes::ChildWorkflowExecutionFailed(attrs) => {
                if let Some(child) = self.child_workflow_mut(attrs.initiated_event_id)
                    && child.observe_close(WorkflowExecutionStatus::Failed, time)
                {
                    child.failure = attrs.failure.clone();
                    child.retry_state = attrs.retry_state;
                }
            }
            EventAttributes::ChildWorkflowExecutionTerminated(attrs) => {
                if let Some(child) = self.child_workflow_mut(attrs.initiated_event_id) {
                    child.observe_close(WorkflowExecutionStatus::Terminated, time);
                }
            }
            EventAttributes::ChildWorkflowExecutionCanceled(attrs) => {
                if let Some(child) = self.child_workflow_mut(attrs.initiated_event_id) {
                    child.observe_close(WorkflowExecutionStatus::Canceled, time);
                }
            }
            EventAttributes::ChildWorkflowExecutionTimedOut(attrs) => {
                if let Some(child) = self.child_workflow_mut(attrs.initiated_event_id)
                    && child.observe_close(WorkflowExecutionStatus::TimedOut, time)
                {
                    child.retry_state = attrs.retry_state;
                }
            }

            EventAttributes::TimerStarted(_) => {
                let mut timer = TimerExecutionState::default();
                timer.update(event)?;
                let pos = self.push_child(ChildState::Timer(timer));
                self.index.timers.insert(event.event_id, pos);
            }
            EventAttributes::TimerFired(attrs) | EventAttributes::TimerCanceled(attrs) => {
                let pos = self.index.timers.get(&attrs.started_event_id).copied();
                self.route(pos, event)?;
            }

            EventAttributes::Other => {}
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.workflow_type.clone()
    }

    fn attempt(&self) -> i32 {
        self.attempt
    }

    fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    fn retry_state(&self) -> RetryState {
        self.retry_state
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn duration(&self) -> Option<Duration> {
        crate::duration::between(self.start_time, self.close_time)
    }
}
