//! History source backed by JSONL files, one workflow run per file.
//!
//! Layout: `<dir>/<workflow_id>_<run_id>.jsonl` or `<dir>/<workflow_id>.jsonl`.
//! Each non-empty line is a [`HistoryEvent`] in JSON; lines starting with `#`
//! are comments. Long polling tails the file until the run's closing event.

use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::source::{HistoryEventIterator, HistorySource, SourceError};
use super::HistoryEvent;

/// Interval between reads of a history file that has no new events
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reads workflow histories from a directory of JSONL files
#[derive(Debug, Clone)]
pub struct FileHistorySource {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileHistorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Resolve the history file for a run, preferring the run-specific file
fn history_path(dir: &Path, workflow_id: &str, run_id: &str) -> Result<PathBuf, SourceError> {
    if !run_id.is_empty() {
        let path = dir.join(format!("{}_{}.jsonl", workflow_id, run_id));
        if path.exists() {
            return Ok(path);
        }
    }
    let path = dir.join(format!("{}.jsonl", workflow_id));
    if path.exists() {
        return Ok(path);
    }
    Err(SourceError::NotFound {
        workflow_id: workflow_id.to_string(),
        run_id: run_id.to_string(),
    })
}

fn is_event_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn parse_event(line_num: usize, line: &str) -> Result<HistoryEvent, SourceError> {
    serde_json::from_str(line.trim()).map_err(|e| SourceError::Json {
        line: line_num,
        source: e,
    })
}

#[async_trait]
impl HistorySource for FileHistorySource {
    async fn describe_workflow(&self, workflow_id: &str, run_id: &str) -> Result<i64, SourceError> {
        let path = history_path(&self.dir, workflow_id, run_id)?;
        let content = tokio::fs::read_to_string(&path).await?;

        let mut last_event_id = 0;
        for (idx, line) in content.lines().enumerate() {
            if !is_event_line(line) {
                continue;
            }
            last_event_id = parse_event(idx + 1, line)?.event_id;
        }
        Ok(last_event_id)
    }

    fn get_history(&self, workflow_id: &str, run_id: &str, long_poll: bool) -> Box<dyn HistoryEventIterator> {
        Box::new(FileEventIterator {
            dir: self.dir.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            long_poll,
            poll_interval: self.poll_interval,
            offset: 0,
            lines_read: 0,
            pending: VecDeque::new(),
            closed: false,
            exhausted: false,
        })
    }
}

/// Tails a single history file
struct FileEventIterator {
    dir: PathBuf,
    workflow_id: String,
    run_id: String,
    long_poll: bool,
    poll_interval: Duration,
    /// Bytes consumed so far (always at a line boundary)
    offset: u64,
    lines_read: usize,
    pending: VecDeque<Result<(usize, String), SourceError>>,
    /// The run's closing event has been read
    closed: bool,
    exhausted: bool,
}

impl FileEventIterator {
    /// Read whatever was appended since the last call. Only complete lines are
    /// consumed while long polling; a trailing partial line waits for its newline.
    async fn read_more(&mut self) -> Result<(), SourceError> {
        let path = history_path(&self.dir, &self.workflow_id, &self.run_id)?;
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;

        let consumed = if self.long_poll {
            match bytes.iter().rposition(|b| *b == b'\n') {
                Some(pos) => pos + 1,
                None => 0,
            }
        } else {
            bytes.len()
        };

        let chunk = String::from_utf8_lossy(&bytes[..consumed]);
        for line in chunk.lines() {
            self.lines_read += 1;
            if is_event_line(line) {
                self.pending.push_back(Ok((self.lines_read, line.to_string())));
            }
        }
        self.offset += consumed as u64;
        Ok(())
    }
}

#[async_trait]
impl HistoryEventIterator for FileEventIterator {
    async fn has_next(&mut self) -> bool {
        loop {
            if !self.pending.is_empty() {
                return true;
            }
            if self.exhausted {
                return false;
            }
            if let Err(e) = self.read_more().await {
                self.exhausted = true;
                self.pending.push_back(Err(e));
                return true;
            }
            if !self.pending.is_empty() {
                return true;
            }
            if !self.long_poll || self.closed {
                self.exhausted = true;
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn next(&mut self) -> Result<Option<HistoryEvent>, SourceError> {
        match self.pending.pop_front() {
            Some(Ok((line_num, line))) => {
                let event = parse_event(line_num, &line)?;
                if event.attributes.closes_workflow() {
                    self.closed = true;
                }
                Ok(Some(event))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EventAttributes;
    use std::io::Write;
    use tempfile::TempDir;

    const STARTED: &str = r#"{"event_id":1,"attributes":{"type":"workflow_execution_started","workflow_type":"foo","attempt":1}}"#;
    const TASK: &str = r#"{"event_id":2,"attributes":{"type":"workflow_task_scheduled"}}"#;
    const COMPLETED: &str = r#"{"event_id":3,"attributes":{"type":"workflow_execution_completed"}}"#;

    fn write_history(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    async fn collect(iter: &mut Box<dyn HistoryEventIterator>) -> Vec<HistoryEvent> {
        let mut events = Vec::new();
        while iter.has_next().await {
            if let Some(event) = iter.next().await.unwrap() {
                events.push(event);
            }
        }
        events
    }

    #[tokio::test]
    async fn test_describe_returns_last_event_id() {
        let temp_dir = TempDir::new().unwrap();
        write_history(temp_dir.path(), "wf.jsonl", &[STARTED, "", "# comment", TASK]);

        let source = FileHistorySource::new(temp_dir.path());
        assert_eq!(source.describe_workflow("wf", "").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_describe_empty_history_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        write_history(temp_dir.path(), "wf.jsonl", &[]);

        let source = FileHistorySource::new(temp_dir.path());
        assert_eq!(source.describe_workflow("wf", "run").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_describe_missing_workflow() {
        let temp_dir = TempDir::new().unwrap();
        let source = FileHistorySource::new(temp_dir.path());
        let err = source.describe_workflow("missing", "").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_specific_file_preferred() {
        let temp_dir = TempDir::new().unwrap();
        write_history(temp_dir.path(), "wf.jsonl", &[STARTED]);
        write_history(temp_dir.path(), "wf_run2.jsonl", &[STARTED, TASK, COMPLETED]);

        let source = FileHistorySource::new(temp_dir.path());
        assert_eq!(source.describe_workflow("wf", "run2").await.unwrap(), 3);
        assert_eq!(source.describe_workflow("wf", "other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_history_without_long_poll() {
        let temp_dir = TempDir::new().unwrap();
        write_history(temp_dir.path(), "wf.jsonl", &[STARTED, TASK]);

        let source = FileHistorySource::new(temp_dir.path());
        let mut iter = source.get_history("wf", "", false);
        let events = collect(&mut iter).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].attributes, EventAttributes::Other);
    }

    #[tokio::test]
    async fn test_invalid_line_reports_line_number() {
        let temp_dir = TempDir::new().unwrap();
        write_history(temp_dir.path(), "wf.jsonl", &[STARTED, "not json"]);

        let source = FileHistorySource::new(temp_dir.path());
        let mut iter = source.get_history("wf", "", false);
        assert!(iter.has_next().await);
        assert!(iter.next().await.unwrap().is_some());
        assert!(iter.has_next().await);
        match iter.next().await {
            Err(SourceError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected JSON error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_timeout_is_a_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let timer = r#"{"event_id":2,"attributes":{"type":"timer_started","timer_id":"t","start_to_fire_timeout":1e30}}"#;
        write_history(temp_dir.path(), "wf.jsonl", &[STARTED, timer]);

        let source = FileHistorySource::new(temp_dir.path());
        let mut iter = source.get_history("wf", "", false);
        assert!(iter.has_next().await);
        assert!(iter.next().await.unwrap().is_some());
        assert!(iter.has_next().await);
        match iter.next().await {
            Err(SourceError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected JSON error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_long_poll_tails_until_closed() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_history(temp_dir.path(), "wf.jsonl", &[STARTED]);

        let source = FileHistorySource::new(temp_dir.path()).with_poll_interval(Duration::from_millis(10));
        let mut iter = source.get_history("wf", "", true);
        assert!(iter.has_next().await);
        assert_eq!(iter.next().await.unwrap().unwrap().event_id, 1);

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{}", TASK).unwrap();
            writeln!(file, "{}", COMPLETED).unwrap();
        });

        let events = collect(&mut iter).await;
        writer.await.unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
