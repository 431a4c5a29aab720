//! Concurrent history fetching for a workflow and its descendants.
//!
//! Every workflow node is driven by one [`WorkflowStateJob`]: describe the
//! run, stream its history into the shared tree, and spawn jobs for child
//! workflows as they start. Child jobs are held back until their parent has
//! replayed the history it had at describe time, then submitted to a pool of
//! at most `concurrency` running jobs.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::history::{EventAttributes, HistoryEvent, HistorySource, WorkflowExecution};
use crate::state::{ExecutionState, WorkflowExecutionState, WorkflowExecutionStatus};
use crate::updates::TraceError;

/// The execution tree shared between fetch tasks and the consumer
pub type SharedState = Arc<RwLock<WorkflowExecutionState>>;

/// What fetch tasks and the supervisor report to the update iterator
#[derive(Debug)]
pub(crate) enum Signal {
    Updated,
    Done,
    Failed(TraceError),
}

pub(crate) struct SchedulerConfig {
    pub source: Arc<dyn HistorySource>,
    pub tree: SharedState,
    pub signals: mpsc::Sender<Signal>,
    pub cancel: CancellationToken,
    pub fetch_all: bool,
    pub fold_status: Vec<WorkflowExecutionStatus>,
    pub depth: i32,
    pub concurrency: usize,
}

/// Everything jobs share. Dropping the last handle closes the submission queue.
struct JobContext {
    source: Arc<dyn HistorySource>,
    tree: SharedState,
    signals: mpsc::Sender<Signal>,
    pool: mpsc::UnboundedSender<WorkflowStateJob>,
    cancel: CancellationToken,
    fetch_all: bool,
    fold_status: Vec<WorkflowExecutionStatus>,
}

/// Fetch task for one workflow node
pub struct WorkflowStateJob {
    ctx: Arc<JobContext>,
    /// Positions in `child_states` from the root down to this node
    path: Vec<usize>,
    execution: WorkflowExecution,
    depth: i32,
    child_jobs: Vec<WorkflowStateJob>,
    is_up_to_date: bool,
}

/// Start the supervisor and submit the root job. Completion or the first
/// error is reported on `config.signals`.
pub(crate) fn start(config: SchedulerConfig) {
    let (pool_tx, pool_rx) = mpsc::unbounded_channel();
    let signals = config.signals.clone();
    let cancel = config.cancel.clone();

    let ctx = Arc::new(JobContext {
        source: config.source,
        tree: config.tree,
        signals: config.signals,
        pool: pool_tx,
        cancel: config.cancel,
        fetch_all: config.fetch_all,
        fold_status: config.fold_status,
    });

    tokio::spawn(async move {
        let root = WorkflowStateJob {
            execution: ctx.tree.read().await.execution.clone(),
            ctx: ctx.clone(),
            path: Vec::new(),
            depth: config.depth,
            child_jobs: Vec::new(),
            is_up_to_date: false,
        };
        let submitted = ctx.pool.send(root).is_ok();
        drop(ctx);

        // Cancellation, whether by the caller or by a dropped iterator, is a normal finish
        let result = if submitted {
            supervise(pool_rx, config.concurrency, &cancel).await
        } else {
            Err(TraceError::Cancelled)
        };

        let signal = match result {
            Ok(()) => Signal::Done,
            Err(TraceError::Cancelled) => Signal::Done,
            Err(e) => {
                warn!(error = %e, "workflow trace failed");
                Signal::Failed(e)
            }
        };
        let _ = signals.send(signal).await;
    });
}

/// Run submitted jobs, at most `concurrency` at a time, until every job has
/// finished and no job can submit more. The first failure cancels the rest.
async fn supervise(
    mut pool: mpsc::UnboundedReceiver<WorkflowStateJob>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<(), TraceError> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut failure = None;

    loop {
        tokio::select! {
            Some(job) = pool.recv() => {
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|_| TraceError::Cancelled)?;
                    job.run().await
                });
            }
            Some(joined) = tasks.join_next() => {
                let err = match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => e,
                    Err(join_err) if join_err.is_panic() => TraceError::TaskPanicked(join_err.to_string()),
                    Err(_) => TraceError::Cancelled,
                };
                failure = Some(err);
                break;
            }
            else => break,
        }
    }

    if failure.is_some() {
        cancel.cancel();
        pool.close();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Await `fut` unless the trace is cancelled first
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, TraceError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TraceError::Cancelled),
        output = fut => Ok(output),
    }
}

impl WorkflowStateJob {
    async fn run(mut self) -> Result<(), TraceError> {
        let ctx = self.ctx.clone();
        let WorkflowExecution { workflow_id, run_id } = self.execution.clone();
        debug!(%workflow_id, %run_id, depth = self.depth, "fetching workflow history");

        let history_length = cancellable(&ctx.cancel, ctx.source.describe_workflow(&workflow_id, &run_id))
            .await?
            .map_err(|source| TraceError::Describe {
                workflow_id: workflow_id.clone(),
                run_id: run_id.clone(),
                source,
            })?;
        let is_archived = history_length == 0;
        {
            let mut tree = ctx.tree.write().await;
            let node = self.node_mut(&mut tree)?;
            node.history_length = history_length;
            node.is_archived = is_archived;
        }
        debug!(%workflow_id, history_length, is_archived, "described workflow");

        let mut events = ctx.source.get_history(&workflow_id, &run_id, !is_archived);
        while cancellable(&ctx.cancel, events.has_next()).await? {
            let event = cancellable(&ctx.cancel, events.next())
                .await?
                .map_err(|source| TraceError::History {
                    workflow_id: workflow_id.clone(),
                    run_id: run_id.clone(),
                    source,
                })?;
            if let Some(event) = event {
                self.apply(event).await?;
            }
        }

        // Stream ended short of the described length
        if !self.is_up_to_date {
            self.catch_up().await?;
        }
        debug!(%workflow_id, "workflow history finished");
        Ok(())
    }

    fn node_mut<'a>(&self, tree: &'a mut WorkflowExecutionState) -> Result<&'a mut WorkflowExecutionState, TraceError> {
        tree.workflow_at_mut(&self.path).ok_or_else(|| TraceError::MissingNode {
            path: self.path.clone(),
        })
    }

    async fn apply(&mut self, event: HistoryEvent) -> Result<(), TraceError> {
        let (child, caught_up) = {
            let mut tree = self.ctx.tree.write().await;
            let node = self.node_mut(&mut tree)?;
            node.update(&event)?;

            let child = match &event.attributes {
                EventAttributes::ChildWorkflowExecutionStarted(attrs) if self.depth != 0 => node
                    .child_workflow_position(attrs.initiated_event_id)
                    .map(|pos| self.child_job(pos, attrs.workflow_execution.clone())),
                _ => None,
            };
            let caught_up = !self.is_up_to_date && event.event_id >= node.history_length;
            (child, caught_up)
        };

        cancellable(&self.ctx.cancel, self.ctx.signals.send(Signal::Updated))
            .await?
            .map_err(|_| TraceError::Cancelled)?;

        if let Some(child) = child {
            if self.is_up_to_date {
                self.submit(child)?;
            } else {
                self.child_jobs.push(child);
            }
        }

        if caught_up {
            self.catch_up().await?;
        }
        Ok(())
    }

    /// Flip to up to date and release held-back children. Children already
    /// closed in a folded status are marked complete without being fetched.
    async fn catch_up(&mut self) -> Result<(), TraceError> {
        self.is_up_to_date = true;
        let pending = std::mem::take(&mut self.child_jobs);
        debug!(workflow_id = %self.execution.workflow_id, pending = pending.len(), "caught up with history");

        for job in pending {
            if !self.ctx.fetch_all {
                let mut tree = self.ctx.tree.write().await;
                let child = job.node_mut(&mut tree)?;
                if self.ctx.fold_status.contains(&child.status) {
                    child.last_event_id = child.history_length;
                    debug!(workflow_id = %job.execution.workflow_id, status = ?child.status, "skipping folded child");
                    continue;
                }
            }
            self.submit(job)?;
        }
        Ok(())
    }

    fn child_job(&self, position: usize, execution: WorkflowExecution) -> WorkflowStateJob {
        let mut path = self.path.clone();
        path.push(position);
        WorkflowStateJob {
            ctx: self.ctx.clone(),
            path,
            execution,
            depth: if self.depth < 0 { self.depth } else { self.depth - 1 },
            child_jobs: Vec::new(),
            is_up_to_date: false,
        }
    }

    fn submit(&self, job: WorkflowStateJob) -> Result<(), TraceError> {
        debug!(workflow_id = %job.execution.workflow_id, depth = job.depth, "submitting child workflow");
        self.ctx.pool.send(job).map_err(|_| TraceError::Cancelled)
    }
}
