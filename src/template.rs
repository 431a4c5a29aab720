//! Text rendering of an execution tree.
//!
//! Each node renders as one line: tree indentation, a status icon, its name
//! and how long it ran. Failures add indented detail lines beneath. Child
//! workflows closed in a folded status are shown without their children.

use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use std::fmt::{self, Write};

use crate::duration::fmt_time_since;
use crate::history::Failure;
use crate::state::{
    ActivityExecutionState, ActivityExecutionStatus, ChildState, ExecutionState, TimerExecutionState,
    TimerExecutionStatus, WorkflowExecutionState, WorkflowExecutionStatus,
};

/// Shallowest depth at which workflows fold; the root is always expanded
pub const MIN_FOLDING_DEPTH: usize = 1;

pub fn icon_running() -> String {
    "▷".blue().to_string()
}
pub fn icon_completed() -> String {
    "✓".green().to_string()
}
pub fn icon_terminated() -> String {
    "x".red().to_string()
}
pub fn icon_canceled() -> String {
    "x".yellow().to_string()
}
pub fn icon_failed() -> String {
    "!".red().to_string()
}
pub fn icon_continue_as_new() -> String {
    "»".green().to_string()
}
pub fn icon_timed_out() -> String {
    "⏱".red().to_string()
}
pub fn icon_unspecified_scheduled() -> String {
    "•".to_string()
}
pub fn icon_cancel_requested() -> String {
    "▷".yellow().to_string()
}
pub fn icon_timer_waiting() -> String {
    "⧖".blue().to_string()
}
pub fn icon_timer_fired() -> String {
    "⧖".green().to_string()
}
pub fn icon_timer_canceled() -> String {
    "⧖".yellow().to_string()
}

pub fn workflow_icon(status: WorkflowExecutionStatus) -> String {
    match status {
        WorkflowExecutionStatus::Unspecified => icon_unspecified_scheduled(),
        WorkflowExecutionStatus::Running => icon_running(),
        WorkflowExecutionStatus::Completed => icon_completed(),
        WorkflowExecutionStatus::Terminated => icon_terminated(),
        WorkflowExecutionStatus::Canceled => icon_canceled(),
        WorkflowExecutionStatus::Failed => icon_failed(),
        WorkflowExecutionStatus::ContinuedAsNew => icon_continue_as_new(),
        WorkflowExecutionStatus::TimedOut => icon_timed_out(),
    }
}

pub fn activity_icon(status: ActivityExecutionStatus) -> String {
    match status {
        ActivityExecutionStatus::Unspecified | ActivityExecutionStatus::Scheduled => icon_unspecified_scheduled(),
        ActivityExecutionStatus::Running => icon_running(),
        ActivityExecutionStatus::Completed => icon_completed(),
        ActivityExecutionStatus::CancelRequested => icon_cancel_requested(),
        ActivityExecutionStatus::Canceled => icon_canceled(),
        ActivityExecutionStatus::Failed => icon_failed(),
        ActivityExecutionStatus::TimedOut => icon_timed_out(),
    }
}

pub fn timer_icon(status: TimerExecutionStatus) -> String {
    match status {
        TimerExecutionStatus::Waiting => icon_timer_waiting(),
        TimerExecutionStatus::Fired => icon_timer_fired(),
        TimerExecutionStatus::Canceled => icon_timer_canceled(),
    }
}

/// Status names and their icons, for help output
pub fn status_legend() -> Vec<(&'static str, String)> {
    vec![
        ("Unspecified or Scheduled", icon_unspecified_scheduled()),
        ("Running", icon_running()),
        ("Completed", icon_completed()),
        ("Continue As New", icon_continue_as_new()),
        ("Failed", icon_failed()),
        ("Timed Out", icon_timed_out()),
        ("Cancel Requested", icon_cancel_requested()),
        ("Canceled", icon_canceled()),
        ("Terminated", icon_terminated()),
    ]
}

fn indent(depth: usize) -> String {
    if depth == 0 {
        return String::new();
    }
    " │  ".repeat(depth).dim().to_string()
}

/// Renders workflow trees. Cheap to clone; holds only folding options.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTemplate {
    fold_status: Vec<WorkflowExecutionStatus>,
    no_fold: bool,
}

impl ExecutionTemplate {
    pub fn new(fold_status: Vec<WorkflowExecutionStatus>, no_fold: bool) -> Self {
        Self { fold_status, no_fold }
    }

    /// Whether `state`, found `depth` hops below the root, hides its children
    pub fn should_fold(&self, state: &WorkflowExecutionState, depth: usize) -> bool {
        if self.no_fold || depth < MIN_FOLDING_DEPTH {
            return false;
        }
        self.fold_status.contains(&state.status)
    }

    pub fn execute<W: Write>(&self, out: &mut W, state: &WorkflowExecutionState) -> fmt::Result {
        self.execute_at(out, state, Utc::now())
    }

    /// Render with elapsed times of running executions measured up to `now`
    pub fn execute_at<W: Write>(&self, out: &mut W, state: &WorkflowExecutionState, now: DateTime<Utc>) -> fmt::Result {
        self.workflow(out, state, 0, now)
    }

    fn workflow<W: Write>(&self, out: &mut W, state: &WorkflowExecutionState, depth: usize, now: DateTime<Utc>) -> fmt::Result {
        write!(out, "{}╪ {} {}", indent(depth), workflow_icon(state.status), state.name())?;
        write_attempt(out, state.attempt, state.maximum_attempts)?;
        write_time(out, state, now)?;
        writeln!(out)?;

        if depth > 0 {
            let ids = format!(
                "wfid: {}, runid: {}",
                state.execution.workflow_id, state.execution.run_id
            );
            writeln!(out, "{}{}", indent(depth + 1), ids.dim())?;
        }
        if let Some(failure) = state.failure() {
            write_failure(out, failure, depth + 1)?;
        }
        if let Some(termination) = &state.termination {
            write_detail(out, &"Terminated:".red().to_string(), &termination.reason, depth + 1)?;
        }
        if let Some(request) = &state.cancel_request
            && !state.is_closed()
        {
            write_detail(out, &"Cancel requested:".yellow().to_string(), &request.cause, depth + 1)?;
        }

        if self.should_fold(state, depth) {
            return Ok(());
        }
        for child in &state.child_states {
            match child {
                ChildState::Workflow(wf) => self.workflow(out, wf, depth + 1, now)?,
                ChildState::Activity(activity) => write_activity(out, activity, depth + 1, now)?,
                ChildState::Timer(timer) => write_timer(out, timer, depth + 1, now)?,
            }
        }
        Ok(())
    }
}

fn write_activity<W: Write>(out: &mut W, state: &ActivityExecutionState, depth: usize, now: DateTime<Utc>) -> fmt::Result {
    write!(out, "{}┼ {} {}", indent(depth), activity_icon(state.status), state.name())?;
    write_attempt(out, state.attempt, 0)?;
    write_time(out, state, now)?;
    writeln!(out)?;
    if let Some(failure) = state.failure() {
        write_failure(out, failure, depth + 1)?;
    }
    Ok(())
}

fn write_timer<W: Write>(out: &mut W, state: &TimerExecutionState, depth: usize, now: DateTime<Utc>) -> fmt::Result {
    write!(out, "{}┼ {} {}", indent(depth), timer_icon(state.status), state.name())?;
    write_time(out, state, now)?;
    writeln!(out)
}

fn write_attempt<W: Write>(out: &mut W, attempt: i32, maximum_attempts: i32) -> fmt::Result {
    if attempt <= 1 {
        return Ok(());
    }
    let text = if maximum_attempts > 0 {
        format!("[{}/{}]", attempt, maximum_attempts)
    } else {
        format!("[{}]", attempt)
    };
    write!(out, " {}", text.yellow())
}

fn write_time<W: Write>(out: &mut W, state: &dyn ExecutionState, now: DateTime<Utc>) -> fmt::Result {
    let elapsed = fmt_time_since(state.start_time(), state.duration(), now);
    if elapsed.is_empty() {
        return Ok(());
    }
    write!(out, " ({})", elapsed)
}

fn write_failure<W: Write>(out: &mut W, failure: &Failure, depth: usize) -> fmt::Result {
    write_detail(out, &"Failure:".red().to_string(), &failure.message, depth)?;
    let mut cause = failure.cause.as_deref();
    while let Some(failure) = cause {
        write_detail(out, &"Caused by:".red().to_string(), &failure.message, depth)?;
        cause = failure.cause.as_deref();
    }
    Ok(())
}

/// Label followed by `text`; continuation lines are indented under the label
fn write_detail<W: Write>(out: &mut W, label: &str, text: &str, depth: usize) -> fmt::Result {
    for (idx, line) in text.split('\n').enumerate() {
        if idx == 0 {
            writeln!(out, "{}{} {}", indent(depth), label, line)?;
        } else {
            writeln!(out, "{}  {}", indent(depth), line)?;
        }
    }
    Ok(())
}

/// Header with the root execution's identity, keys padded to a common width
pub fn write_summary<W: Write>(out: &mut W, state: &WorkflowExecutionState) -> fmt::Result {
    let rows = [
        ("Workflow Id", state.execution.workflow_id.as_str()),
        ("Workflow Run Id", state.execution.run_id.as_str()),
        ("Workflow Type", state.workflow_type.as_str()),
    ];
    let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);

    writeln!(out, "{}", "Execution summary:".bold())?;
    for (key, value) in rows {
        writeln!(out, "  {} : {}", format!("{:<width$}", key).bold(), value)?;
    }
    writeln!(out)
}
