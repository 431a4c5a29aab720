//! Pull-based access to a live, concurrently reconstructed execution tree.
//!
//! [`get_workflow_execution_updates`] starts the scheduler in the background
//! and returns a [`WorkflowExecutionUpdateIterator`]. Each successful
//! `has_next()` is followed by exactly one `next()`, which yields a handle to
//! the shared tree or the error that stopped the computation.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::history::{HistorySource, SourceError};
use crate::scheduler::{self, SharedState, Signal};
use crate::state::{StateError, WorkflowExecutionState, WorkflowExecutionStatus};

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("invalid value for concurrency (expected non-zero positive integer, got {0})")]
    InvalidConcurrency(i64),
    #[error("failed to describe workflow {workflow_id} (run: {run_id:?}): {source}")]
    Describe {
        workflow_id: String,
        run_id: String,
        source: SourceError,
    },
    #[error("failed to read history of workflow {workflow_id} (run: {run_id:?}): {source}")]
    History {
        workflow_id: String,
        run_id: String,
        source: SourceError,
    },
    #[error("inconsistent history: {0}")]
    State(#[from] StateError),
    #[error("workflow node at {path:?} is missing from the execution tree")]
    MissingNode { path: Vec<usize> },
    #[error("please call has_next() before next()")]
    NextWithoutHasNext,
    #[error("tracing task panicked: {0}")]
    TaskPanicked(String),
    #[error("tracing was cancelled")]
    Cancelled,
}

/// How far and how eagerly to follow child workflows
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Fetch every child, even those already closed in a folded status
    pub fetch_all: bool,
    /// Child statuses that are not fetched unless `fetch_all` is set
    pub fold_status: Vec<WorkflowExecutionStatus>,
    /// Child hops to follow; negative means unlimited
    pub depth: i32,
    /// Maximum number of histories fetched at once
    pub concurrency: i64,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            fetch_all: false,
            fold_status: vec![
                WorkflowExecutionStatus::Completed,
                WorkflowExecutionStatus::Canceled,
                WorkflowExecutionStatus::Terminated,
            ],
            depth: -1,
            concurrency: 10,
        }
    }
}

/// Start reconstructing `workflow_id`/`run_id` and its children in the background.
///
/// Must be called from within a tokio runtime. Invalid concurrency is rejected
/// before any work starts; fetch and protocol errors surface through the
/// returned iterator.
pub fn get_workflow_execution_updates(
    cancel: &CancellationToken,
    source: Arc<dyn HistorySource>,
    workflow_id: &str,
    run_id: &str,
    options: UpdateOptions,
) -> Result<WorkflowExecutionUpdateIterator, TraceError> {
    if options.concurrency < 1 {
        return Err(TraceError::InvalidConcurrency(options.concurrency));
    }
    let concurrency = usize::try_from(options.concurrency).map_err(|_| TraceError::InvalidConcurrency(options.concurrency))?;

    debug!(workflow_id, run_id, depth = options.depth, concurrency, "starting workflow trace");

    let state: SharedState = Arc::new(RwLock::new(WorkflowExecutionState::new(workflow_id, run_id)));
    let cancel = cancel.child_token();
    let (signal_tx, signal_rx) = mpsc::channel(1);

    scheduler::start(scheduler::SchedulerConfig {
        source,
        tree: state.clone(),
        signals: signal_tx,
        cancel: cancel.clone(),
        fetch_all: options.fetch_all,
        fold_status: options.fold_status,
        depth: options.depth,
        concurrency,
    });

    Ok(WorkflowExecutionUpdateIterator {
        state,
        signals: signal_rx,
        latch: Latch::Empty,
        finished: false,
        cancel,
    })
}

/// A view of the live execution tree after at least one more event was applied.
/// Holds the shared tree itself, not a copy.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionUpdate {
    state: SharedState,
}

impl WorkflowExecutionUpdate {
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Read access to the tree. Hold it only while rendering; writers wait on it.
    pub async fn read(&self) -> RwLockReadGuard<'_, WorkflowExecutionState> {
        self.state.read().await
    }
}

enum Latch {
    Empty,
    Update,
    Error(TraceError),
}

pub struct WorkflowExecutionUpdateIterator {
    state: SharedState,
    signals: mpsc::Receiver<Signal>,
    latch: Latch,
    finished: bool,
    cancel: CancellationToken,
}

impl WorkflowExecutionUpdateIterator {
    /// Wait for the next signal. `true` means `next()` holds an update or an
    /// error; `false` means the computation finished.
    pub async fn has_next(&mut self) -> bool {
        if self.finished {
            return false;
        }
        match self.signals.recv().await {
            Some(Signal::Updated) => {
                self.latch = Latch::Update;
                true
            }
            Some(Signal::Failed(e)) => {
                self.latch = Latch::Error(e);
                true
            }
            Some(Signal::Done) | None => {
                self.latch = Latch::Empty;
                self.finished = true;
                false
            }
        }
    }

    /// Take what the preceding `has_next()` latched. An error ends the sequence.
    pub fn next(&mut self) -> Result<WorkflowExecutionUpdate, TraceError> {
        match std::mem::replace(&mut self.latch, Latch::Empty) {
            Latch::Update => Ok(WorkflowExecutionUpdate {
                state: self.state.clone(),
            }),
            Latch::Error(e) => {
                self.finished = true;
                self.cancel.cancel();
                Err(e)
            }
            Latch::Empty => Err(TraceError::NextWithoutHasNext),
        }
    }

    /// The tree being reconstructed, readable at any time
    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

impl Drop for WorkflowExecutionUpdateIterator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
