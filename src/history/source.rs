//! Collaborator traits for reading workflow histories.

use async_trait::async_trait;
use thiserror::Error;

use super::HistoryEvent;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("workflow execution not found: {workflow_id} (run: {run_id:?})")]
    NotFound { workflow_id: String, run_id: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Ordered stream of history events for a single workflow run.
///
/// `has_next` may block while long polling for new events; `next` yields
/// `Ok(None)` for entries that carry no event.
#[async_trait]
pub trait HistoryEventIterator: Send {
    async fn has_next(&mut self) -> bool;
    async fn next(&mut self) -> Result<Option<HistoryEvent>, SourceError>;
}

/// Where workflow histories come from
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Number of events currently in the workflow's history. Zero for
    /// archived executions.
    async fn describe_workflow(&self, workflow_id: &str, run_id: &str) -> Result<i64, SourceError>;

    /// Iterator over the workflow's history. With `long_poll` the iterator
    /// keeps waiting for new events until the run closes.
    fn get_history(&self, workflow_id: &str, run_id: &str, long_poll: bool) -> Box<dyn HistoryEventIterator>;
}
