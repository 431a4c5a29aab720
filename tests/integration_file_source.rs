//! End-to-end tests over JSONL history files.
//!
//! Histories are written to a temp directory, traced through
//! `FileHistorySource`, and rendered with `WorkflowTracer` into a buffer.

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wftrace::term::tail::strip_ansi;
use wftrace::test_helpers::*;
use wftrace::{
    ExecutionTemplate, FileHistorySource, HistoryEvent, TermWriter, UpdateOptions, WorkflowExecutionStatus,
    WorkflowTracer, get_workflow_execution_updates,
};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn plain(&self) -> String {
        String::from_utf8_lossy(&strip_ansi(&self.0.lock().unwrap())).to_string()
    }
}

fn write_history(dir: &Path, name: &str, events: &[HistoryEvent]) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    for event in events {
        writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
    }
}

fn source(dir: &Path) -> Arc<FileHistorySource> {
    Arc::new(FileHistorySource::new(dir).with_poll_interval(Duration::from_millis(5)))
}

fn order_histories(dir: &Path) {
    write_history(
        dir,
        "order.jsonl",
        &[
            workflow_started(1, "OrderWorkflow"),
            activity_scheduled(2, "reserve", "ReserveStock"),
            activity_started(3, 2, 1),
            activity_completed(4, 2),
            child_initiated(5, "payment", "PaymentWorkflow"),
            child_started(6, 5, "payment", "run-pay"),
            child_failed(7, 5, "card declined"),
            workflow_failed(8, "payment failed"),
        ],
    );
    write_history(
        dir,
        "payment_run-pay.jsonl",
        &[
            workflow_started(1, "PaymentWorkflow"),
            activity_scheduled(2, "charge", "ChargeCard"),
            activity_started(3, 2, 3),
            activity_failed(4, 2, "card declined"),
            workflow_failed(5, "card declined"),
        ],
    );
}

// ===========================================================================
// Tree reconstruction
// ===========================================================================

#[tokio::test]
async fn test_file_histories_build_full_tree() {
    let temp_dir = TempDir::new().unwrap();
    order_histories(temp_dir.path());

    let mut iter = get_workflow_execution_updates(
        &CancellationToken::new(),
        source(temp_dir.path()),
        "order",
        "",
        UpdateOptions::default(),
    )
    .unwrap();
    let mut updates = 0;
    while iter.has_next().await {
        iter.next().unwrap();
        updates += 1;
    }
    assert_eq!(updates, 13);

    let tree = iter.state().read().await;
    assert_eq!(tree.status, WorkflowExecutionStatus::Failed);
    assert_eq!(tree.number_of_events(), (13, 13));
    let payment = tree.workflow_at(&[1]).unwrap();
    assert_eq!(payment.status, WorkflowExecutionStatus::Failed);
    assert_eq!(payment.workflow_type, "PaymentWorkflow");
    assert_eq!(payment.child_states.len(), 1);
}

#[tokio::test]
async fn test_missing_history_file_surfaces_describe_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut iter = get_workflow_execution_updates(
        &CancellationToken::new(),
        source(temp_dir.path()),
        "ghost",
        "",
        UpdateOptions::default(),
    )
    .unwrap();

    assert!(iter.has_next().await);
    let err = iter.next().err().unwrap();
    assert!(err.to_string().contains("ghost"));
    assert!(!iter.has_next().await);
}

#[tokio::test]
async fn test_appended_events_are_picked_up() {
    let temp_dir = TempDir::new().unwrap();
    write_history(temp_dir.path(), "live.jsonl", &[workflow_started(1, "Live")]);

    let mut iter = get_workflow_execution_updates(
        &CancellationToken::new(),
        source(temp_dir.path()),
        "live",
        "",
        UpdateOptions::default(),
    )
    .unwrap();
    assert!(iter.has_next().await);
    iter.next().unwrap();

    write_history(
        temp_dir.path(),
        "live.jsonl",
        &[workflow_started(1, "Live"), other(2), workflow_completed(3)],
    );
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        while iter.has_next().await {
            iter.next().unwrap();
        }
    })
    .await;
    assert!(finished.is_ok(), "tail never saw the closing event");

    let tree = iter.state().read().await;
    assert_eq!(tree.status, WorkflowExecutionStatus::Completed);
    assert_eq!(tree.last_event_id, 3);
}

// ===========================================================================
// Rendering
// ===========================================================================

#[tokio::test]
async fn test_tracer_renders_failed_order() {
    let temp_dir = TempDir::new().unwrap();
    order_histories(temp_dir.path());

    let updates = get_workflow_execution_updates(
        &CancellationToken::new(),
        source(temp_dir.path()),
        "order",
        "",
        UpdateOptions::default(),
    )
    .unwrap();
    let out = SharedBuf::default();
    let writer = TermWriter::with_writer(Box::new(out.clone())).with_size(120, 40).unwrap();
    let mut tracer = WorkflowTracer::new(writer, ExecutionTemplate::default(), Duration::from_millis(10));

    let code = tracer.run(updates, std::future::pending()).await.unwrap();
    assert_eq!(code, 2);

    let printed = out.plain();
    assert!(printed.contains("Workflow Id"));
    assert!(printed.contains("OrderWorkflow"));
    assert!(printed.contains("ReserveStock"));
    assert!(printed.contains("PaymentWorkflow"));
    assert!(printed.contains("ChargeCard"));
    assert!(printed.contains("wfid: payment, runid: run-pay"));
    assert!(printed.contains("card declined"));
}
