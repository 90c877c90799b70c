//! In-memory session pool used by the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bench_core::{
    BidRange, ConnectionConfig, ExecutionMode, FailurePolicy, Parameters, QueryStats,
    RetryPolicy, ScriptSource, Session, SessionError, SessionPool, WorkerTask,
};

type FailureRule = Box<dyn Fn(usize, &Parameters) -> Option<SessionError> + Send + Sync>;

/// One call to `execute_in_transaction`.
#[derive(Debug, Clone)]
pub struct Execution {
    pub script: String,
    pub bid: Option<i64>,
    pub tid: Option<i64>,
    pub aid: Option<i64>,
    pub iteration: Option<i64>,
    pub params: usize,
}

#[derive(Default)]
struct MockState {
    executions: Vec<Execution>,
    calls: usize,
    acquired: usize,
    released: usize,
    outstanding: usize,
    max_outstanding: usize,
    statements: Vec<String>,
}

struct Shared {
    state: Mutex<MockState>,
    fail_when: Option<FailureRule>,
}

pub struct MockPool {
    shared: Arc<Shared>,
    branches: i64,
    count_error: Option<SessionError>,
    retry: RetryPolicy,
}

impl MockPool {
    pub fn new(branches: i64) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState::default()),
                fail_when: None,
            }),
            branches,
            count_error: None,
            retry: RetryPolicy {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        }
    }

    /// Fail a call when `rule(call_index, params)` returns an error.
    pub fn failing_when(
        branches: i64,
        rule: impl Fn(usize, &Parameters) -> Option<SessionError> + Send + Sync + 'static,
    ) -> Self {
        let mut pool = Self::new(branches);
        pool.shared = Arc::new(Shared {
            state: Mutex::new(MockState::default()),
            fail_when: Some(Box::new(rule)),
        });
        pool
    }

    /// Make the branch count query fail with `error`.
    pub fn with_count_error(mut self, error: SessionError) -> Self {
        self.count_error = Some(error);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.shared.state.lock().unwrap().executions.clone()
    }

    pub fn calls(&self) -> usize {
        self.shared.state.lock().unwrap().calls
    }

    pub fn acquired(&self) -> usize {
        self.shared.state.lock().unwrap().acquired
    }

    pub fn released(&self) -> usize {
        self.shared.state.lock().unwrap().released
    }

    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().unwrap().outstanding
    }

    pub fn max_outstanding(&self) -> usize {
        self.shared.state.lock().unwrap().max_outstanding
    }

    pub fn statements(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().statements.clone()
    }
}

pub struct MockSession {
    shared: Arc<Shared>,
}

#[async_trait]
impl Session for MockSession {
    async fn execute_in_transaction(
        &mut self,
        script: &str,
        params: &Parameters,
    ) -> Result<QueryStats, SessionError> {
        let call = {
            let mut state = self.shared.state.lock().unwrap();
            state.calls += 1;
            state.calls - 1
        };

        // Give sibling jobs a chance to interleave
        tokio::task::yield_now().await;

        if let Some(error) = self.shared.fail_when.as_ref().and_then(|f| f(call, params)) {
            return Err(error);
        }

        self.shared
            .state
            .lock()
            .unwrap()
            .executions
            .push(Execution {
                script: script.to_string(),
                bid: params.get("bid"),
                tid: params.get("tid"),
                aid: params.get("aid"),
                iteration: params.get("iteration"),
                params: params.len(),
            });

        Ok(QueryStats {
            total_duration_us: 1500,
            total_cpu_us: 0,
        })
    }
}

#[async_trait]
impl SessionPool for MockPool {
    type Session = MockSession;

    async fn acquire(&self) -> Result<MockSession, SessionError> {
        let mut state = self.shared.state.lock().unwrap();
        state.acquired += 1;
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
        Ok(MockSession {
            shared: Arc::clone(&self.shared),
        })
    }

    async fn release(&self, _session: MockSession) {
        let mut state = self.shared.state.lock().unwrap();
        state.released += 1;
        state.outstanding -= 1;
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn execute_with_retries(&self, sql: &str) -> Result<(), SessionError> {
        self.shared
            .state
            .lock()
            .unwrap()
            .statements
            .push(sql.to_string());
        Ok(())
    }

    async fn query_count_with_retries(&self, sql: &str) -> Result<i64, SessionError> {
        self.shared
            .state
            .lock()
            .unwrap()
            .statements
            .push(sql.to_string());
        match &self.count_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.branches),
        }
    }
}

pub fn connection() -> ConnectionConfig {
    ConnectionConfig {
        endpoint: "localhost:5432".to_string(),
        database: "bench".to_string(),
        ca_file: None,
        user: None,
        password: None,
        table_folder: "pgbench".to_string(),
        pool_size: 16,
    }
}

pub fn task(range: BidRange, scale: i64, jobs: usize, transactions: u64) -> WorkerTask {
    WorkerTask {
        process_id: 1,
        connection: connection(),
        range,
        scale,
        jobs,
        transactions,
        preheat: 0,
        mode: ExecutionMode::Pooled,
        failure_policy: FailurePolicy::Wait,
        settle_delay: Duration::ZERO,
        scripts: vec![ScriptSource::builtin("tpcb-like", 1.0).unwrap()],
    }
}
