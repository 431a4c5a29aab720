//! Workflow history events as delivered by the orchestration service.
//!
//! Each [`HistoryEvent`] carries a sequence id, an optional timestamp and a
//! typed attribute payload. The attribute enum doubles as the event type tag.

pub mod file;
pub mod source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use file::FileHistorySource;
pub use source::{HistoryEventIterator, HistorySource, SourceError};

/// Identity of a single workflow run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    /// Empty until the run has been resolved
    #[serde(default)]
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.run_id.is_empty() {
            write!(f, "{}", self.workflow_id)
        } else {
            write!(f, "{}/{}", self.workflow_id, self.run_id)
        }
    }
}

/// Failure reported by a workflow or activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Failure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Failure>>,
}

/// Why an execution will or won't be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryState {
    #[default]
    Unspecified,
    InProgress,
    NonRetryableFailure,
    Timeout,
    MaximumAttemptsReached,
    RetryPolicyNotSet,
    InternalServerError,
    CancelRequested,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    /// 0 means unlimited
    #[serde(default)]
    pub maximum_attempts: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowExecutionStartedAttributes {
    pub workflow_type: String,
    #[serde(default)]
    pub attempt: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_workflow_execution: Option<WorkflowExecution>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_execution_run_id: String,
    #[serde(default, with = "crate::duration::secs", skip_serializing_if = "Option::is_none")]
    pub workflow_execution_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowExecutionFailedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub retry_state: RetryState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowExecutionTerminatedAttributes {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowExecutionCancelRequestedAttributes {
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowExecutionContinuedAsNewAttributes {
    #[serde(default)]
    pub new_execution_run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowExecutionTimedOutAttributes {
    #[serde(default)]
    pub retry_state: RetryState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivityTaskScheduledAttributes {
    pub activity_id: String,
    pub activity_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivityTaskStartedAttributes {
    pub scheduled_event_id: i64,
    #[serde(default)]
    pub attempt: i32,
    #[serde(default)]
    pub identity: String,
}

/// Attributes shared by activity events that only reference the scheduling event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivityTaskRefAttributes {
    pub scheduled_event_id: i64,
}

/// Attributes of failed and timed-out activity events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivityTaskFailureAttributes {
    pub scheduled_event_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub retry_state: RetryState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StartChildWorkflowExecutionInitiatedAttributes {
    pub workflow_id: String,
    pub workflow_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChildWorkflowExecutionStartedAttributes {
    pub initiated_event_id: i64,
    pub workflow_execution: WorkflowExecution,
}

/// Attributes shared by child workflow events that only reference the initiating event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChildWorkflowExecutionRefAttributes {
    pub initiated_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChildWorkflowExecutionFailedAttributes {
    pub initiated_event_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub retry_state: RetryState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChildWorkflowExecutionTimedOutAttributes {
    pub initiated_event_id: i64,
    #[serde(default)]
    pub retry_state: RetryState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimerStartedAttributes {
    pub timer_id: String,
    #[serde(default, with = "crate::duration::secs", skip_serializing_if = "Option::is_none")]
    pub start_to_fire_timeout: Option<Duration>,
}

/// Attributes shared by timer events that reference the starting event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimerRefAttributes {
    pub started_event_id: i64,
}

/// Typed event payload. The variant is the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventAttributes {
    WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed(WorkflowExecutionFailedAttributes),
    WorkflowExecutionTerminated(WorkflowExecutionTerminatedAttributes),
    WorkflowExecutionCancelRequested(WorkflowExecutionCancelRequestedAttributes),
    WorkflowExecutionCanceled,
    WorkflowExecutionContinuedAsNew(WorkflowExecutionContinuedAsNewAttributes),
    WorkflowExecutionTimedOut(WorkflowExecutionTimedOutAttributes),

    ActivityTaskScheduled(ActivityTaskScheduledAttributes),
    ActivityTaskStarted(ActivityTaskStartedAttributes),
    ActivityTaskCompleted(ActivityTaskRefAttributes),
    ActivityTaskFailed(ActivityTaskFailureAttributes),
    ActivityTaskCancelRequested(ActivityTaskRefAttributes),
    ActivityTaskCanceled(ActivityTaskRefAttributes),
    ActivityTaskTimedOut(ActivityTaskFailureAttributes),

    StartChildWorkflowExecutionInitiated(StartChildWorkflowExecutionInitiatedAttributes),
    ChildWorkflowExecutionStarted(ChildWorkflowExecutionStartedAttributes),
    ChildWorkflowExecutionCompleted(ChildWorkflowExecutionRefAttributes),
    ChildWorkflowExecutionFailed(ChildWorkflowExecutionFailedAttributes),
    ChildWorkflowExecutionTerminated(ChildWorkflowExecutionRefAttributes),
    ChildWorkflowExecutionCanceled(ChildWorkflowExecutionRefAttributes),
    ChildWorkflowExecutionTimedOut(ChildWorkflowExecutionTimedOutAttributes),

    TimerStarted(TimerStartedAttributes),
    TimerFired(TimerRefAttributes),
    TimerCanceled(TimerRefAttributes),

    /// Any event the tracer does not fold into execution state
    #[serde(other)]
    Other,
}

impl EventAttributes {
    /// Snake-case name of the event type, as used on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            EventAttributes::WorkflowExecutionStarted(_) => "workflow_execution_started",
            EventAttributes::WorkflowExecutionCompleted => "workflow_execution_completed",
            EventAttributes::WorkflowExecutionFailed(_) => "workflow_execution_failed",
            EventAttributes::WorkflowExecutionTerminated(_) => "workflow_execution_terminated",
            EventAttributes::WorkflowExecutionCancelRequested(_) => "workflow_execution_cancel_requested",
            EventAttributes::WorkflowExecutionCanceled => "workflow_execution_canceled",
            EventAttributes::WorkflowExecutionContinuedAsNew(_) => "workflow_execution_continued_as_new",
            EventAttributes::WorkflowExecutionTimedOut(_) => "workflow_execution_timed_out",
            EventAttributes::ActivityTaskScheduled(_) => "activity_task_scheduled",
            EventAttributes::ActivityTaskStarted(_) => "activity_task_started",
            EventAttributes::ActivityTaskCompleted(_) => "activity_task_completed",
            EventAttributes::ActivityTaskFailed(_) => "activity_task_failed",
            EventAttributes::ActivityTaskCancelRequested(_) => "activity_task_cancel_requested",
            EventAttributes::ActivityTaskCanceled(_) => "activity_task_canceled",
            EventAttributes::ActivityTaskTimedOut(_) => "activity_task_timed_out",
            EventAttributes::StartChildWorkflowExecutionInitiated(_) => {
                "start_child_workflow_execution_initiated"
            }
            EventAttributes::ChildWorkflowExecutionStarted(_) => "child_workflow_execution_started",
            EventAttributes::ChildWorkflowExecutionCompleted(_) => "child_workflow_execution_completed",
            EventAttributes::ChildWorkflowExecutionFailed(_) => "child_workflow_execution_failed",
            EventAttributes::ChildWorkflowExecutionTerminated(_) => "child_workflow_execution_terminated",
            EventAttributes::ChildWorkflowExecutionCanceled(_) => "child_workflow_execution_canceled",
            EventAttributes::ChildWorkflowExecutionTimedOut(_) => "child_workflow_execution_timed_out",
            EventAttributes::TimerStarted(_) => "timer_started",
            EventAttributes::TimerFired(_) => "timer_fired",
            EventAttributes::TimerCanceled(_) => "timer_canceled",
            EventAttributes::Other => "other",
        }
    }

    /// True for the events that close the workflow run whose history they belong to
    pub fn closes_workflow(&self) -> bool {
        matches!(
            self,
            EventAttributes::WorkflowExecutionCompleted
                | EventAttributes::WorkflowExecutionFailed(_)
                | EventAttributes::WorkflowExecutionTerminated(_)
                | EventAttributes::WorkflowExecutionCanceled
                | EventAttributes::WorkflowExecutionContinuedAsNew(_)
                | EventAttributes::WorkflowExecutionTimedOut(_)
        )
    }
}

/// A single entry of a workflow's append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(event_id: i64, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            event_time: None,
            attributes,
        }
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.event_time = Some(time);
        self
    }
}
