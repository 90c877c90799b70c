//! Job loop and coordinator behavior against the in-memory pool.

mod common;

use std::cell::RefCell;

use bench_core::{
    split, BenchError, BidRange, ExecutionMode, FailurePolicy, JobLoop, JobState,
    MetricsCollector, RetryPolicy, ScriptCatalog, ScriptSource, SessionError,
    TransactionExecutor, WorkerCoordinator,
};
use common::MockPool;
use tokio_util::sync::CancellationToken;

fn catalog() -> ScriptCatalog {
    ScriptCatalog::from_sources(
        &[ScriptSource::builtin("tpcb-like", 1.0).unwrap()],
        "pgbench",
    )
    .unwrap()
}

#[tokio::test]
async fn test_preheat_runs_but_is_not_recorded() {
    let pool = MockPool::new(10);
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor =
        TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 10, &catalog, &metrics)
            .with_preheat(3);

    let mut job = JobLoop::new(1, executor);
    let outcome = job
        .run(&pool, ExecutionMode::Pooled, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.iterations, 10);
    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(job.operation().invocations(), 10);
    assert_eq!(pool.calls(), 10);
    assert_eq!(metrics.borrow().len(), 7);
}

#[tokio::test]
async fn test_pooled_mode_retries_aborted_transactions() {
    let pool = MockPool::failing_when(10, |call, _| {
        (call < 2).then(|| SessionError::Aborted("could not serialize access".into()))
    });
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor = TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 1, &catalog, &metrics);

    let mut job = JobLoop::new(1, executor);
    job.run(&pool, ExecutionMode::Pooled, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(pool.calls(), 3);
    assert_eq!(pool.executions().len(), 1);
    assert_eq!(pool.acquired(), 3);
    assert_eq!(pool.released(), 3);

    let summary = metrics.borrow().summary();
    assert_eq!(summary.total_transactions, 3);
    assert_eq!(summary.failed_transactions, 2);
    assert_eq!(summary.successful_transactions, 1);
}

#[tokio::test]
async fn test_pooled_mode_gives_up_after_max_attempts() {
    let pool = MockPool::failing_when(10, |_, _| Some(SessionError::Aborted("deadlock".into())))
        .with_retry_policy(RetryPolicy {
            max_attempts: 4,
            ..RetryPolicy::none()
        });
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor = TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 5, &catalog, &metrics);

    let mut job = JobLoop::new(1, executor);
    let result = job
        .run(&pool, ExecutionMode::Pooled, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(BenchError::Transaction(SessionError::Aborted(_)))
    ));
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(pool.calls(), 4);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_query_errors_are_not_retried() {
    let pool = MockPool::failing_when(10, |_, _| Some(SessionError::Query("syntax error".into())));
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor = TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 5, &catalog, &metrics);

    let mut job = JobLoop::new(1, executor);
    let result = job
        .run(&pool, ExecutionMode::Pooled, &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(pool.calls(), 1);
    let summary = metrics.borrow().summary();
    assert_eq!(summary.failed_transactions, 1);
}

#[tokio::test]
async fn test_single_session_holds_one_session() {
    let pool = MockPool::new(10);
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor = TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 5, &catalog, &metrics);

    let mut job = JobLoop::new(1, executor);
    job.run(&pool, ExecutionMode::SingleSession, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(pool.acquired(), 1);
    assert_eq!(pool.released(), 1);
    assert_eq!(pool.calls(), 5);
    assert_eq!(metrics.borrow().len(), 5);
}

#[tokio::test]
async fn test_single_session_released_on_failure() {
    let pool = MockPool::failing_when(10, |call, _| {
        (call == 2).then(|| SessionError::Aborted("40001".into()))
    });
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor = TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 5, &catalog, &metrics);

    let mut job = JobLoop::new(1, executor);
    let result = job
        .run(&pool, ExecutionMode::SingleSession, &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(pool.calls(), 3);
    assert_eq!(pool.acquired(), 1);
    assert_eq!(pool.released(), 1);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_cancelled_job_stops_before_first_iteration() {
    let pool = MockPool::new(10);
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executor = TransactionExecutor::new(BidRange::new(1, 10).unwrap(), 5, &catalog, &metrics);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut job = JobLoop::new(1, executor);
    let outcome = job
        .run(&pool, ExecutionMode::SingleSession, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.state, JobState::Stopped);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(pool.calls(), 0);
    assert_eq!(pool.released(), pool.acquired());
}

fn failing_branch_pool() -> MockPool {
    MockPool::failing_when(2, |_, params| {
        (params.get("bid") == Some(1)).then(|| SessionError::Query("constraint violated".into()))
    })
}

#[tokio::test]
async fn test_wait_policy_lets_siblings_finish() {
    let pool = failing_branch_pool();
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executors: Vec<_> = split(1, 2, 2)
        .unwrap()
        .into_iter()
        .map(|range| TransactionExecutor::new(range, 50, &catalog, &metrics))
        .collect();

    let coordinator = WorkerCoordinator::new(ExecutionMode::Pooled, FailurePolicy::Wait);
    let result = coordinator.run(&pool, executors).await;

    match result {
        Err(BenchError::JobsFailed { failed, total, .. }) => {
            assert_eq!(failed, 1);
            assert_eq!(total, 2);
        }
        other => panic!("expected JobsFailed, got {other:?}"),
    }
    assert_eq!(pool.executions().len(), 50);
    assert!(pool.executions().iter().all(|e| e.bid == Some(2)));
}

#[tokio::test]
async fn test_stop_siblings_policy_cancels_remaining_jobs() {
    let pool = failing_branch_pool();
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executors: Vec<_> = split(1, 2, 2)
        .unwrap()
        .into_iter()
        .map(|range| TransactionExecutor::new(range, 50, &catalog, &metrics))
        .collect();

    let coordinator =
        WorkerCoordinator::new(ExecutionMode::SingleSession, FailurePolicy::StopSiblings);
    let result = coordinator.run(&pool, executors).await;

    assert!(matches!(result, Err(BenchError::JobsFailed { failed: 1, .. })));
    assert!(pool.executions().len() < 50);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_coordinator_runs_all_jobs() {
    let pool = MockPool::new(100);
    let catalog = catalog();
    let metrics = RefCell::new(MetricsCollector::new());
    let executors: Vec<_> = split(1, 100, 4)
        .unwrap()
        .into_iter()
        .map(|range| TransactionExecutor::new(range, 25, &catalog, &metrics))
        .collect();

    let coordinator = WorkerCoordinator::new(ExecutionMode::Pooled, FailurePolicy::Wait);
    let report = coordinator.run(&pool, executors).await.unwrap();

    assert_eq!(report.jobs, 4);
    assert_eq!(report.completed, 4);
    assert_eq!(report.stopped, 0);
    assert_eq!(report.iterations, 100);
    assert_eq!(metrics.borrow().len(), 100);
    assert!(pool.max_outstanding() <= 4);
}
