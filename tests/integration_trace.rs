//! End-to-end tests for reconstructing workflow trees from history sources.
//!
//! These drive `get_workflow_execution_updates` against the in-memory source
//! and check the resulting tree, the fetches that were issued, and how the
//! update iterator behaves at its edges.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wftrace::test_helpers::*;
use wftrace::{
    ChildState, HistoryEvent, TraceError, UpdateOptions, WorkflowExecutionStatus, WorkflowExecutionUpdateIterator,
    get_workflow_execution_updates,
};

fn options(depth: i32, concurrency: i64) -> UpdateOptions {
    UpdateOptions {
        depth,
        concurrency,
        ..UpdateOptions::default()
    }
}

/// Pull every update, recording `last_event_id` per workflow id after each one
async fn drain(iter: &mut WorkflowExecutionUpdateIterator) -> HashMap<String, Vec<i64>> {
    let mut seen: HashMap<String, Vec<i64>> = HashMap::new();
    while iter.has_next().await {
        let update = iter.next().unwrap();
        let tree = update.read().await;
        let mut stack = vec![&*tree];
        while let Some(node) = stack.pop() {
            seen.entry(node.execution.workflow_id.clone())
                .or_default()
                .push(node.last_event_id);
            stack.extend(node.child_workflows());
        }
    }
    seen
}

fn parent_with_child() -> Vec<HistoryEvent> {
    vec![
        workflow_started(1, "Parent"),
        child_initiated(2, "child", "Child"),
        child_started(3, 2, "child", "run-c"),
    ]
}

// ===========================================================================
// 1. Reconstructing a parent and its child
// ===========================================================================

#[tokio::test]
async fn test_parent_and_child_end_to_end() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", parent_with_child())
            .with_history("child", vec![workflow_started(1, "Child")]),
    );
    let mut iter = get_workflow_execution_updates(&CancellationToken::new(), source, "root", "", options(-1, 5)).unwrap();
    drain(&mut iter).await;

    let tree = iter.state().read().await;
    assert_eq!(tree.status, WorkflowExecutionStatus::Running);
    assert_eq!(tree.last_event_id, 3);
    assert_eq!(tree.child_states.len(), 1);

    let child = tree.workflow_at(&[0]).unwrap();
    assert_eq!(child.status, WorkflowExecutionStatus::Running);
    assert_eq!(child.last_event_id, 1);
    assert_eq!(child.execution.run_id, "run-c");
    assert_eq!(child.parent_execution.as_ref().map(|p| p.workflow_id.as_str()), Some("root"));
}

#[tokio::test]
async fn test_last_event_id_strictly_increases_per_node() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history(
                "root",
                vec![
                    workflow_started(1, "Parent"),
                    activity_scheduled(2, "a", "Prepare"),
                    activity_started(3, 2, 1),
                    activity_completed(4, 2),
                    child_initiated(5, "child", "Child"),
                    child_started(6, 5, "child", "run-c"),
                    other(7),
                ],
            )
            .with_history(
                "child",
                vec![workflow_started(1, "Child"), timer_started(2, "2", 5), timer_fired(3, 2), workflow_completed(4)],
            ),
    );
    let mut iter = get_workflow_execution_updates(&CancellationToken::new(), source, "root", "", options(-1, 5)).unwrap();
    let seen = drain(&mut iter).await;

    for (workflow_id, ids) in &seen {
        let changes: Vec<i64> = ids.iter().copied().fold(Vec::new(), |mut acc, id| {
            if acc.last() != Some(&id) {
                acc.push(id);
            }
            acc
        });
        assert!(
            changes.windows(2).all(|w| w[0] < w[1]),
            "last_event_id of {} went backwards: {:?}",
            workflow_id,
            ids
        );
    }
    let tree = iter.state().read().await;
    assert_eq!(tree.workflow_at(&[1]).unwrap().status, WorkflowExecutionStatus::Completed);
}

#[tokio::test]
async fn test_grandchildren_followed_with_unlimited_depth() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", parent_with_child())
            .with_history(
                "child",
                vec![
                    workflow_started(1, "Child"),
                    child_initiated(2, "grandchild", "Grandchild"),
                    child_started(3, 2, "grandchild", "run-g"),
                ],
            )
            .with_history("grandchild", vec![workflow_started(1, "Grandchild"), workflow_completed(2)]),
    );
    let mut iter =
        get_workflow_execution_updates(&CancellationToken::new(), source.clone(), "root", "", options(-1, 1)).unwrap();
    drain(&mut iter).await;

    let tree = iter.state().read().await;
    let grandchild = tree.workflow_at(&[0, 0]).unwrap();
    assert_eq!(grandchild.status, WorkflowExecutionStatus::Completed);
    assert_eq!(grandchild.last_event_id, 2);
    assert_eq!(source.history_calls("grandchild"), 1);
    assert_eq!(tree.number_of_events(), (8, 8));
}

// ===========================================================================
// 2. Depth and fold limits
// ===========================================================================

#[tokio::test]
async fn test_depth_bound() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", parent_with_child())
            .with_history(
                "child",
                vec![
                    workflow_started(1, "Child"),
                    child_initiated(2, "grandchild", "Grandchild"),
                    child_started(3, 2, "grandchild", "run-g"),
                ],
            )
            .with_history("grandchild", vec![workflow_started(1, "Grandchild")]),
    );
    let mut iter =
        get_workflow_execution_updates(&CancellationToken::new(), source.clone(), "root", "", options(1, 5)).unwrap();
    drain(&mut iter).await;

    let tree = iter.state().read().await;
    assert_eq!(tree.workflow_at(&[0]).unwrap().last_event_id, 3);
    let grandchild = tree.workflow_at(&[0, 0]).unwrap();
    assert_eq!(grandchild.last_event_id, 0);
    assert_eq!(grandchild.workflow_type, "Grandchild");
    assert_eq!(source.describe_calls("grandchild"), 0);
    assert_eq!(source.history_calls("grandchild"), 0);
}

#[tokio::test]
async fn test_depth_zero_fetches_only_root() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", parent_with_child())
            .with_history("child", vec![workflow_started(1, "Child")]),
    );
    let mut iter =
        get_workflow_execution_updates(&CancellationToken::new(), source.clone(), "root", "", options(0, 5)).unwrap();
    drain(&mut iter).await;

    let tree = iter.state().read().await;
    assert_eq!(tree.workflow_at(&[0]).unwrap().last_event_id, 0);
    assert_eq!(source.history_calls("child"), 0);
}

#[tokio::test]
async fn test_skip_set_child_never_fetched() {
    let mut history = parent_with_child();
    history.push(child_terminated(4, 2));
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", history)
            .with_history("child", vec![workflow_started(1, "Child"), other(2)]),
    );
    let mut iter =
        get_workflow_execution_updates(&CancellationToken::new(), source.clone(), "root", "", options(-1, 5)).unwrap();
    drain(&mut iter).await;

    let tree = iter.state().read().await;
    let child = tree.workflow_at(&[0]).unwrap();
    assert_eq!(child.status, WorkflowExecutionStatus::Terminated);
    assert_eq!(child.last_event_id, child.history_length);
    assert_eq!(source.history_calls("child"), 0);
}

#[tokio::test]
async fn test_running_child_fetched_despite_fold_set() {
    let mut history = parent_with_child();
    history.push(other(4));
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", history)
            .with_history("child", vec![workflow_started(1, "Child")]),
    );
    let mut iter =
        get_workflow_execution_updates(&CancellationToken::new(), source.clone(), "root", "", options(-1, 5)).unwrap();
    drain(&mut iter).await;

    assert_eq!(source.history_calls("child"), 1);
}

// ===========================================================================
// 3. Errors and iterator contract
// ===========================================================================

#[tokio::test]
async fn test_invalid_concurrency_rejected_synchronously() {
    let source = Arc::new(MemoryHistorySource::new().with_history("root", parent_with_child()));
    let err = get_workflow_execution_updates(&CancellationToken::new(), source.clone(), "root", "", options(-1, 0))
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "invalid value for concurrency (expected non-zero positive integer, got 0)"
    );
    assert_eq!(source.describe_calls("root"), 0);
}

#[tokio::test]
async fn test_child_describe_failure_is_fatal() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", parent_with_child())
            .with_history("child", vec![workflow_started(1, "Child")])
            .failing_describe("child"),
    );
    let mut iter = get_workflow_execution_updates(&CancellationToken::new(), source, "root", "", options(-1, 5)).unwrap();

    let mut errors = Vec::new();
    while iter.has_next().await {
        if let Err(e) = iter.next() {
            errors.push(e);
        }
    }
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], TraceError::Describe { workflow_id, .. } if workflow_id == "child"));
}

#[tokio::test]
async fn test_next_twice_fails_loudly() {
    let source = Arc::new(MemoryHistorySource::new().with_history("root", parent_with_child()));
    let mut iter = get_workflow_execution_updates(&CancellationToken::new(), source, "root", "", options(-1, 5)).unwrap();
    assert!(iter.has_next().await);
    iter.next().unwrap();
    let err = iter.next().err().unwrap();
    assert!(matches!(err, TraceError::NextWithoutHasNext));
}

#[tokio::test]
async fn test_caller_cancellation_ends_iteration() {
    let source = Arc::new(
        MemoryHistorySource::new()
            .with_history("root", parent_with_child())
            .with_history("child", vec![workflow_started(1, "Child")])
            .blocking_at_end(),
    );
    let cancel = CancellationToken::new();
    let mut iter = get_workflow_execution_updates(&cancel, source, "root", "", options(-1, 5)).unwrap();

    let mut updates = 0;
    while updates < 4 && iter.has_next().await {
        iter.next().unwrap();
        updates += 1;
    }
    cancel.cancel();

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while iter.has_next().await {
            let _ = iter.next();
        }
    })
    .await;
    assert!(ended.is_ok(), "iteration did not finish after cancellation");
}

#[tokio::test]
async fn test_activities_and_timers_appear_in_order() {
    let source = Arc::new(MemoryHistorySource::new().with_history(
        "root",
        vec![
            workflow_started(1, "W"),
            timer_started(2, "2", 1),
            activity_scheduled(3, "a", "A"),
            timer_fired(4, 2),
            activity_started(5, 3, 1),
            activity_timed_out(6, 3),
            workflow_timed_out(7),
        ],
    ));
    let mut iter = get_workflow_execution_updates(&CancellationToken::new(), source, "root", "", options(-1, 1)).unwrap();
    drain(&mut iter).await;

    let tree = iter.state().read().await;
    assert_eq!(tree.status, WorkflowExecutionStatus::TimedOut);
    assert!(matches!(tree.child_states[0], ChildState::Timer(_)));
    assert!(matches!(tree.child_states[1], ChildState::Activity(_)));
}
