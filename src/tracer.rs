//! Consumer loop that drives an update iterator and redraws the trace.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::state::{WorkflowExecutionState, WorkflowExecutionStatus};
use crate::template::{ExecutionTemplate, write_summary};
use crate::term::{RenderError, TermWriter};
use crate::updates::{TraceError, WorkflowExecutionUpdateIterator};

/// Shortest redraw period; shorter requests are raised to it
pub const MIN_UPDATE_PERIOD: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum TracerError {
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to render execution: {0}")]
    Format(#[from] fmt::Error),
}

/// Process exit code for a root workflow that ended in `status`
pub fn exit_code(status: WorkflowExecutionStatus) -> i32 {
    match status {
        WorkflowExecutionStatus::Failed => 2,
        WorkflowExecutionStatus::TimedOut => 3,
        WorkflowExecutionStatus::Unspecified => 4,
        _ => 0,
    }
}

pub fn progress_string(current_events: i64, total_events: i64) -> String {
    if total_events == 0 {
        if current_events == 0 {
            return "Processing HistoryEvents".to_string();
        }
        return format!("Processing HistoryEvents ({})", current_events);
    }
    format!("Processing HistoryEvents ({}/{})", current_events, total_events)
}

pub struct WorkflowTracer {
    writer: TermWriter,
    template: ExecutionTemplate,
    update_period: Duration,
}

impl WorkflowTracer {
    pub fn new(writer: TermWriter, template: ExecutionTemplate, update_period: Duration) -> Self {
        Self {
            writer,
            template,
            update_period: update_period.max(MIN_UPDATE_PERIOD),
        }
    }

    pub fn update_period(&self) -> Duration {
        self.update_period
    }

    /// Show progress until the tree has caught up with its histories, then
    /// redraw it every update period. Returns the exit code for the root's
    /// final status once updates finish or `interrupt` resolves.
    pub async fn run<F>(&mut self, mut updates: WorkflowExecutionUpdateIterator, interrupt: F) -> Result<i32, TracerError>
    where
        F: Future<Output = ()>,
    {
        let state = updates.state().clone();
        let mut ticker = tokio::time::interval(self.update_period);
        let mut has_update = false;
        let mut is_up_to_date = false;
        tokio::pin!(interrupt);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !has_update {
                        continue;
                    }
                    let tree = state.read().await;
                    if is_up_to_date {
                        self.render(&tree)?;
                    } else {
                        let (current, total) = tree.number_of_events();
                        is_up_to_date = total > 0 && current >= total && !tree.is_archived;
                        self.writer.write_line(&progress_string(current, total));
                    }
                    self.writer.flush(true)?;
                }
                more = updates.has_next() => {
                    if !more {
                        break;
                    }
                    updates.next()?;
                    has_update = true;
                }
                _ = &mut interrupt => {
                    tracing::debug!("trace interrupted");
                    break;
                }
            }
        }

        if !has_update {
            return Ok(0);
        }
        let tree = state.read().await;
        self.render(&tree)?;
        self.writer.flush(false)?;
        Ok(exit_code(tree.status))
    }

    fn render(&mut self, tree: &WorkflowExecutionState) -> Result<(), TracerError> {
        write_summary(&mut self.writer, tree)?;
        self.template.execute(&mut self.writer, tree)?;
        Ok(())
    }
}
