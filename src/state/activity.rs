use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::{ExecutionState, StateError};
use crate::history::{EventAttributes, Failure, HistoryEvent, RetryState};

/// Activity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityExecutionStatus {
    #[default]
    Unspecified,
    Scheduled,
    Running,
    Completed,
    Failed,
    TimedOut,
    CancelRequested,
    Canceled,
}

impl ActivityExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActivityExecutionStatus::Completed
                | ActivityExecutionStatus::Failed
                | ActivityExecutionStatus::TimedOut
                | ActivityExecutionStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ActivityExecutionState {
    pub activity_id: String,
    pub activity_type: String,
    pub status: ActivityExecutionStatus,
    pub attempt: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub retry_state: RetryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
}

impl ActivityExecutionState {
    /// Move to a terminal status. Returns false if the activity had already closed.
    fn close(&mut self, status: ActivityExecutionStatus, time: Option<DateTime<Utc>>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if self.close_time.is_none() {
            self.close_time = time;
        }
        true
    }
}

impl ExecutionState for ActivityExecutionState {
    fn update(&mut self, event: &HistoryEvent) -> Result<(), StateError> {
        match &event.attributes {
            EventAttributes::ActivityTaskScheduled(attrs) => {
                self.activity_id = attrs.activity_id.clone();
                self.activity_type = attrs.activity_type.clone();
                if self.status == ActivityExecutionStatus::Unspecified {
                    self.status = ActivityExecutionStatus::Scheduled;
                }
            }
            EventAttributes::ActivityTaskStarted(attrs) => {
                self.attempt = attrs.attempt;
                self.start_time = event.event_time;
                self.failure = None;
                if !self.status.is_terminal() && self.status != ActivityExecutionStatus::CancelRequested {
                    self.status = ActivityExecutionStatus::Running;
                }
            }
            EventAttributes::ActivityTaskCompleted(_) => {
                self.close(ActivityExecutionStatus::Completed, event.event_time);
            }
            EventAttributes::ActivityTaskFailed(attrs) => {
                if self.close(ActivityExecutionStatus::Failed, event.event_time) {
                    self.failure = attrs.failure.clone();
                    self.retry_state = attrs.retry_state;
                }
            }
            EventAttributes::ActivityTaskTimedOut(attrs) => {
                if self.close(ActivityExecutionStatus::TimedOut, event.event_time) {
                    self.failure = attrs.failure.clone();
                    self.retry_state = attrs.retry_state;
                }
            }
            EventAttributes::ActivityTaskCancelRequested(_) => {
                if !self.status.is_terminal() {
                    self.status = ActivityExecutionStatus::CancelRequested;
                }
            }
            EventAttributes::ActivityTaskCanceled(_) => {
                self.close(ActivityExecutionStatus::Canceled, event.event_time);
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.activity_type.clone()
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
