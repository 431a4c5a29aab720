use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::{ExecutionState, StateError};
use crate::duration::fmt_duration;
use crate::history::{EventAttributes, Failure, HistoryEvent, RetryState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TimerExecutionStatus {
    #[default]
    Waiting,
    Fired,
    Canceled,
}

impl TimerExecutionStatus {
    pub fn is_terminal(self) -> bool {
        self != TimerExecutionStatus::Waiting
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct TimerExecutionState {
    pub timer_id: String,
    /// Display name, e.g. `Timer (1m0s)` or `<timer id> (1m0s)` for named timers
    pub name: String,
    #[serde(with = "crate::duration::secs", skip_serializing_if = "Option::is_none")]
    pub start_to_fire_timeout: Option<Duration>,
    pub status: TimerExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
}

impl TimerExecutionState {
    fn close(&mut self, status: TimerExecutionStatus, time: Option<DateTime<Utc>>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if self.close_time.is_none() {
            self.close_time = time;
        }
    }
}

/// Timers without a custom id reuse their started event id as the timer id
fn timer_name(timer_id: &str, event_id: i64, timeout: Option<Duration>) -> String {
    let timeout = fmt_duration(timeout.unwrap_or_default());
    if timer_id != event_id.to_string() {
        format!("{} ({})", timer_id, timeout)
    } else {
        format!("Timer ({})", timeout)
    }
}

impl ExecutionState for TimerExecutionState {
    fn update(&mut self, event: &HistoryEvent) -> Result<(), StateError> {
        match &event.attributes {
            EventAttributes::TimerStarted(attrs) => {
                self.timer_id = attrs.timer_id.clone();
                self.start_to_fire_timeout = attrs.start_to_fire_timeout;
                self.name = timer_name(&attrs.timer_id, event.event_id, attrs.start_to_fire_timeout);
                self.start_time = event.event_time;
            }
            EventAttributes::TimerFired(_) => self.close(TimerExecutionStatus::Fired, event.event_time),
            EventAttributes::TimerCanceled(_) => self.close(TimerExecutionStatus::Canceled, event.event_time),
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn attempt(&self) -> i32 {
        1
    }

    fn failure(&self) -> Option<&Failure> {
        None
    }

    fn retry_state(&self) -> RetryState {
        RetryState::Unspecified
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn duration(&self) -> Option<Duration> {
        crate::duration::between(self.start_time, self.close_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn test_default_timer_name() {
        let mut timer = TimerExecutionState::default();
        timer.update(&timer_started(8, "8", 60)).unwrap();
        assert_eq!(timer.name(), "Timer (1m0s)");
        assert_eq!(timer.status, TimerExecutionStatus::Waiting);
    }

    #[test]
    fn test_custom_timer_name() {
        let mut timer = TimerExecutionState::default();
        timer.update(&timer_started(8, "reminder", 90)).unwrap();
        assert_eq!(timer.name(), "reminder (1m30s)");
        assert_eq!(timer.timer_id, "reminder");
    }

    #[test]
    fn test_fired_then_canceled_keeps_fired() {
        let mut timer = TimerExecutionState::default();
        timer.update(&timer_started(8, "8", 5)).unwrap();
        timer.update(&timer_fired(10, 8)).unwrap();
        timer.update(&timer_canceled(11, 8)).unwrap();
        assert_eq!(timer.status, TimerExecutionStatus::Fired);
        assert_eq!(timer.duration(), Some(Duration::from_secs(2)));
        assert_eq!(timer.attempt(), 1);
        assert_eq!(timer.retry_state(), RetryState::Unspecified);
    }
}
