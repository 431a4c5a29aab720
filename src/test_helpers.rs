use crate::history::{
    ActivityTaskFailureAttributes, ActivityTaskRefAttributes, ActivityTaskScheduledAttributes,
    ActivityTaskStartedAttributes, ChildWorkflowExecutionFailedAttributes,
    ChildWorkflowExecutionRefAttributes, ChildWorkflowExecutionStartedAttributes,
    ChildWorkflowExecutionTimedOutAttributes, EventAttributes, Failure, HistoryEvent,
    HistoryEventIterator, HistorySource, RetryState, SourceError,
    StartChildWorkflowExecutionInitiatedAttributes, TimerRefAttributes, TimerStartedAttributes,
    WorkflowExecution, WorkflowExecutionCancelRequestedAttributes,
    WorkflowExecutionContinuedAsNewAttributes, WorkflowExecutionFailedAttributes,
    WorkflowExecutionStartedAttributes, WorkflowExecutionTerminatedAttributes,
    WorkflowExecutionTimedOutAttributes,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Fixed reference time. Builders stamp each event `event_id` seconds after it.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

/// Create an event timestamped `event_id` seconds after [`base_time`].
pub fn event(event_id: i64, attributes: EventAttributes) -> HistoryEvent {
    HistoryEvent::new(event_id, attributes).at(base_time() + chrono::Duration::seconds(event_id))
}

fn failure(message: &str) -> Option<Failure> {
    Some(Failure {
        message: message.to_string(),
        ..Failure::default()
    })
}

pub fn other(event_id: i64) -> HistoryEvent {
    event(event_id, EventAttributes::Other)
}

pub fn workflow_started(event_id: i64, workflow_type: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
            workflow_type: workflow_type.to_string(),
            attempt: 1,
            ..WorkflowExecutionStartedAttributes::default()
        }),
    )
}

pub fn workflow_completed(event_id: i64) -> HistoryEvent {
    event(event_id, EventAttributes::WorkflowExecutionCompleted)
}

pub fn workflow_failed(event_id: i64, message: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::WorkflowExecutionFailed(WorkflowExecutionFailedAttributes {
            failure: failure(message),
            retry_state: RetryState::NonRetryableFailure,
        }),
    )
}

pub fn workflow_terminated(event_id: i64, reason: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::WorkflowExecutionTerminated(WorkflowExecutionTerminatedAttributes {
            reason: reason.to_string(),
            identity: "tester".to_string(),
        }),
    )
}

pub fn workflow_cancel_requested(event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::WorkflowExecutionCancelRequested(WorkflowExecutionCancelRequestedAttributes {
            cause: "requested".to_string(),
            identity: "tester".to_string(),
        }),
    )
}

pub fn workflow_canceled(event_id: i64) -> HistoryEvent {
    event(event_id, EventAttributes::WorkflowExecutionCanceled)
}

pub fn workflow_continued_as_new(event_id: i64, new_run_id: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::WorkflowExecutionContinuedAsNew(WorkflowExecutionContinuedAsNewAttributes {
            new_execution_run_id: new_run_id.to_string(),
        }),
    )
}

pub fn workflow_timed_out(event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::WorkflowExecutionTimedOut(WorkflowExecutionTimedOutAttributes {
            retry_state: RetryState::Timeout,
        }),
    )
}

pub fn activity_scheduled(event_id: i64, activity_id: &str, activity_type: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskScheduled(ActivityTaskScheduledAttributes {
            activity_id: activity_id.to_string(),
            activity_type: activity_type.to_string(),
        }),
    )
}

pub fn activity_started(event_id: i64, scheduled_event_id: i64, attempt: i32) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskStarted(ActivityTaskStartedAttributes {
            scheduled_event_id,
            attempt,
            identity: "worker".to_string(),
        }),
    )
}

pub fn activity_completed(event_id: i64, scheduled_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskCompleted(ActivityTaskRefAttributes { scheduled_event_id }),
    )
}

pub fn activity_failed(event_id: i64, scheduled_event_id: i64, message: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskFailed(ActivityTaskFailureAttributes {
            scheduled_event_id,
            failure: failure(message),
            retry_state: RetryState::NonRetryableFailure,
        }),
    )
}

pub fn activity_timed_out(event_id: i64, scheduled_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskTimedOut(ActivityTaskFailureAttributes {
            scheduled_event_id,
            failure: failure("activity timeout"),
            retry_state: RetryState::Timeout,
        }),
    )
}

pub fn activity_cancel_requested(event_id: i64, scheduled_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskCancelRequested(ActivityTaskRefAttributes { scheduled_event_id }),
    )
}

pub fn activity_canceled(event_id: i64, scheduled_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ActivityTaskCanceled(ActivityTaskRefAttributes { scheduled_event_id }),
    )
}

pub fn child_initiated(event_id: i64, workflow_id: &str, workflow_type: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::StartChildWorkflowExecutionInitiated(StartChildWorkflowExecutionInitiatedAttributes {
            workflow_id: workflow_id.to_string(),
            workflow_type: workflow_type.to_string(),
        }),
    )
}

pub fn child_started(event_id: i64, initiated_event_id: i64, workflow_id: &str, run_id: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ChildWorkflowExecutionStarted(ChildWorkflowExecutionStartedAttributes {
            initiated_event_id,
            workflow_execution: WorkflowExecution::new(workflow_id, run_id),
        }),
    )
}

pub fn child_completed(event_id: i64, initiated_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ChildWorkflowExecutionCompleted(ChildWorkflowExecutionRefAttributes { initiated_event_id }),
    )
}

pub fn child_failed(event_id: i64, initiated_event_id: i64, message: &str) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ChildWorkflowExecutionFailed(ChildWorkflowExecutionFailedAttributes {
            initiated_event_id,
            failure: failure(message),
            retry_state: RetryState::NonRetryableFailure,
        }),
    )
}

pub fn child_terminated(event_id: i64, initiated_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ChildWorkflowExecutionTerminated(ChildWorkflowExecutionRefAttributes { initiated_event_id }),
    )
}

pub fn child_canceled(event_id: i64, initiated_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ChildWorkflowExecutionCanceled(ChildWorkflowExecutionRefAttributes { initiated_event_id }),
    )
}

pub fn child_timed_out(event_id: i64, initiated_event_id: i64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::ChildWorkflowExecutionTimedOut(ChildWorkflowExecutionTimedOutAttributes {
            initiated_event_id,
            retry_state: RetryState::Timeout,
        }),
    )
}

pub fn timer_started(event_id: i64, timer_id: &str, timeout_secs: u64) -> HistoryEvent {
    event(
        event_id,
        EventAttributes::TimerStarted(TimerStartedAttributes {
            timer_id: timer_id.to_string(),
            start_to_fire_timeout: Some(Duration::from_secs(timeout_secs)),
        }),
    )
}

pub fn timer_fired(event_id: i64, started_event_id: i64) -> HistoryEvent {
    event(event_id, EventAttributes::TimerFired(TimerRefAttributes { started_event_id }))
}

pub fn timer_canceled(event_id: i64, started_event_id: i64) -> HistoryEvent {
    event(event_id, EventAttributes::TimerCanceled(TimerRefAttributes { started_event_id }))
}

/// In-memory history source keyed by workflow id, counting every call it serves.
#[derive(Default)]
pub struct MemoryHistorySource {
    histories: HashMap<String, Vec<HistoryEvent>>,
    failing_describe: HashSet<String>,
    failing_history: HashSet<String>,
    /// Long-poll iterators wait forever once their events run out
    block_at_end: bool,
    describe_calls: Mutex<HashMap<String, usize>>,
    history_calls: Mutex<Vec<(String, bool)>>,
}

impl MemoryHistorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, workflow_id: &str, events: Vec<HistoryEvent>) -> Self {
        self.histories.insert(workflow_id.to_string(), events);
        self
    }

    pub fn failing_describe(mut self, workflow_id: &str) -> Self {
        self.failing_describe.insert(workflow_id.to_string());
        self
    }

    pub fn failing_history(mut self, workflow_id: &str) -> Self {
        self.failing_history.insert(workflow_id.to_string());
        self
    }

    pub fn blocking_at_end(mut self) -> Self {
        self.block_at_end = true;
        self
    }

    pub fn describe_calls(&self, workflow_id: &str) -> usize {
        self.describe_calls.lock().unwrap().get(workflow_id).copied().unwrap_or(0)
    }

    pub fn history_calls(&self, workflow_id: &str) -> usize {
        self.history_calls.lock().unwrap().iter().filter(|(id, _)| id == workflow_id).count()
    }

    /// `(workflow_id, long_poll)` for every `get_history` call, in call order
    pub fn history_requests(&self) -> Vec<(String, bool)> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySource for MemoryHistorySource {
    async fn describe_workflow(&self, workflow_id: &str, run_id: &str) -> Result<i64, SourceError> {
        *self.describe_calls.lock().unwrap().entry(workflow_id.to_string()).or_default() += 1;
        if self.failing_describe.contains(workflow_id) {
            return Err(SourceError::Other(format!("describe failed for {}", workflow_id)));
        }
        match self.histories.get(workflow_id) {
            Some(events) => Ok(events.last().map_or(0, |e| e.event_id)),
            None => Err(SourceError::NotFound {
                workflow_id: workflow_id.to_string(),
                run_id: run_id.to_string(),
            }),
        }
    }

    fn get_history(&self, workflow_id: &str, _run_id: &str, long_poll: bool) -> Box<dyn HistoryEventIterator> {
        self.history_calls.lock().unwrap().push((workflow_id.to_string(), long_poll));
        let mut events: VecDeque<Result<HistoryEvent, SourceError>> = self
            .histories
            .get(workflow_id)
            .map(|events| events.iter().cloned().map(Ok).collect())
            .unwrap_or_default();
        if self.failing_history.contains(workflow_id) {
            events.push_back(Err(SourceError::Other(format!("history failed for {}", workflow_id))));
        }
        Box::new(MemoryEventIterator {
            events,
            block_at_end: self.block_at_end && long_poll,
        })
    }
}

struct MemoryEventIterator {
    events: VecDeque<Result<HistoryEvent, SourceError>>,
    block_at_end: bool,
}

#[async_trait]
impl HistoryEventIterator for MemoryEventIterator {
    async fn has_next(&mut self) -> bool {
        if self.events.is_empty() && self.block_at_end {
            std::future::pending::<()>().await;
        }
        !self.events.is_empty()
    }

    async fn next(&mut self) -> Result<Option<HistoryEvent>, SourceError> {
        self.events.pop_front().transpose()
    }
}
