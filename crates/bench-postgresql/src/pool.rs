//! Bounded PostgreSQL session pool.
//!
//! Sessions are plain `tokio_postgres` clients. Each one keeps a cache of the
//! statements it has prepared, keyed by script text, so a workload script is
//! parsed and prepared once per connection.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bench_core::{
    ConnectionConfig, Parameters, QueryStats, RetryPolicy, Session, SessionError, SessionPool,
};
use postgres_native_tls::MakeTlsConnector;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, Statement};
use tracing::{debug, error, info};

use crate::error::PostgreSQLError;
use crate::script::{compile_script, CompiledStatement};

/// Default PostgreSQL port when the endpoint omits one.
pub const DEFAULT_PORT: u16 = 5432;

const APPLICATION_NAME: &str = "tpcb-bench";

/// Elapsed time of the current transaction, measured on the server.
const SERVER_DURATION_SQL: &str =
    "SELECT (EXTRACT(EPOCH FROM clock_timestamp() - transaction_timestamp()) * 1000000)::bigint";

/// Pool sizing and retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_sessions: usize,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
enum Connector {
    Plain,
    Tls(MakeTlsConnector),
}

struct PreparedStatement {
    statement: Statement,
    compiled: CompiledStatement,
}

/// An open connection plus the statements prepared on it.
struct PooledClient {
    client: Client,
    prepared: HashMap<String, Arc<Vec<PreparedStatement>>>,
}

/// Session borrowed from a [`PgSessionPool`].
pub struct PgSession {
    inner: PooledClient,
    _permit: OwnedSemaphorePermit,
}

impl PgSession {
    async fn prepare_script(
        &mut self,
        script: &str,
    ) -> Result<Arc<Vec<PreparedStatement>>, PostgreSQLError> {
        if let Some(prepared) = self.inner.prepared.get(script) {
            return Ok(Arc::clone(prepared));
        }

        let mut prepared = Vec::new();
        for compiled in compile_script(script)? {
            let statement = self.inner.client.prepare(&compiled.sql).await?;
            prepared.push(PreparedStatement {
                statement,
                compiled,
            });
        }
        let prepared = Arc::new(prepared);
        self.inner
            .prepared
            .insert(script.to_string(), Arc::clone(&prepared));
        debug!("Prepared script with {} statements", prepared.len());
        Ok(prepared)
    }

    async fn run_transaction(
        &mut self,
        script: &str,
        params: &Parameters,
    ) -> Result<QueryStats, PostgreSQLError> {
        let prepared = self.prepare_script(script).await?;

        let transaction = self.inner.client.transaction().await?;
        for step in prepared.iter() {
            let values = step.compiled.values(params)?;
            let refs: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            // query() drains every row of the result
            transaction.query(&step.statement, &refs).await?;
        }

        let row = transaction.query_one(SERVER_DURATION_SQL, &[]).await?;
        let total_duration_us: i64 = row.try_get(0)?;
        transaction.commit().await?;

        Ok(QueryStats {
            total_duration_us,
            // PostgreSQL does not report per-transaction CPU time
            total_cpu_us: 0,
        })
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute_in_transaction(
        &mut self,
        script: &str,
        params: &Parameters,
    ) -> Result<QueryStats, SessionError> {
        self.run_transaction(script, params)
            .await
            .map_err(SessionError::from)
    }
}

/// Session pool bounded by a semaphore.
pub struct PgSessionPool {
    config: Config,
    connector: Connector,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<PooledClient>>,
    retry: RetryPolicy,
}

impl PgSessionPool {
    /// Build a pool and verify that the server is reachable.
    pub async fn connect(
        connection: &ConnectionConfig,
        options: PoolOptions,
    ) -> Result<Self, PostgreSQLError> {
        let mut config = build_config(connection)?;
        config.connect_timeout(options.connect_timeout);

        let connector = match &connection.ca_file {
            Some(path) => {
                let pem = fs::read(path)?;
                let certificate = native_tls::Certificate::from_pem(&pem)?;
                let tls = native_tls::TlsConnector::builder()
                    .add_root_certificate(certificate)
                    .build()?;
                Connector::Tls(MakeTlsConnector::new(tls))
            }
            None => Connector::Plain,
        };

        let pool = Self {
            config,
            connector,
            semaphore: Arc::new(Semaphore::new(options.max_sessions.max(1))),
            idle: Mutex::new(Vec::new()),
            retry: options.retry,
        };

        // Test connection
        let client = pool.open().await?;
        client.client.simple_query("SELECT 1").await?;
        pool.put_idle(client);

        info!(
            "Connected to PostgreSQL at {} (pool size {})",
            connection.endpoint, options.max_sessions
        );
        Ok(pool)
    }

    async fn open(&self) -> Result<PooledClient, PostgreSQLError> {
        let client = match &self.connector {
            Connector::Plain => {
                let (client, connection) = self.config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("PostgreSQL connection error: {}", e);
                    }
                });
                client
            }
            Connector::Tls(tls) => {
                let (client, connection) = self.config.connect(tls.clone()).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("PostgreSQL connection error: {}", e);
                    }
                });
                client
            }
        };
        Ok(PooledClient {
            client,
            prepared: HashMap::new(),
        })
    }

    fn take_idle(&self) -> Option<PooledClient> {
        let mut idle = self.idle.lock().ok()?;
        while let Some(client) = idle.pop() {
            if !client.client.is_closed() {
                return Some(client);
            }
        }
        None
    }

    fn put_idle(&self, client: PooledClient) {
        if client.client.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(client);
        }
    }

    /// Close the pool; waiting and future acquisitions fail with `PoolClosed`.
    pub fn close(&self) {
        self.semaphore.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }

    async fn simple_query_with_retries(
        &self,
        sql: &str,
    ) -> Result<Vec<SimpleQueryMessage>, SessionError> {
        let mut attempt = 0;
        loop {
            let result = match self.acquire().await {
                Ok(session) => {
                    let result = session
                        .inner
                        .client
                        .simple_query(sql)
                        .await
                        .map_err(|e| SessionError::from(PostgreSQLError::from(e)));
                    self.release(session).await;
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(messages) => return Ok(messages),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.backoff(attempt);
                    debug!("Retrying in {:?} after: {}", delay, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SessionPool for PgSessionPool {
    type Session = PgSession;

    async fn acquire(&self) -> Result<PgSession, SessionError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SessionError::PoolClosed)?;

        let inner = match self.take_idle() {
            Some(client) => client,
            None => self.open().await.map_err(SessionError::from)?,
        };

        Ok(PgSession {
            inner,
            _permit: permit,
        })
    }

    async fn release(&self, session: PgSession) {
        let PgSession { inner, _permit } = session;
        self.put_idle(inner);
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn execute_with_retries(&self, sql: &str) -> Result<(), SessionError> {
        self.simple_query_with_retries(sql).await.map(|_| ())
    }

    async fn query_count_with_retries(&self, sql: &str) -> Result<i64, SessionError> {
        let messages = self.simple_query_with_retries(sql).await?;
        let value = messages.iter().find_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row.get(0).map(str::to_string)),
            _ => None,
        });
        match value {
            Some(Some(text)) => text.parse::<i64>().map_err(|_| {
                SessionError::from(PostgreSQLError::UnexpectedResult(format!(
                    "expected an integer, got '{text}'"
                )))
            }),
            _ => Err(SessionError::from(PostgreSQLError::UnexpectedResult(
                "query returned no value".to_string(),
            ))),
        }
    }
}

/// Build a client configuration from an endpoint and credentials.
///
/// The endpoint is either a `postgresql://` URL or `host[:port]`. The
/// database, user and password from `connection` take precedence.
pub fn build_config(connection: &ConnectionConfig) -> Result<Config, PostgreSQLError> {
    let endpoint = connection.endpoint.trim();
    let mut config = if endpoint.starts_with("postgres://") || endpoint.starts_with("postgresql://")
    {
        endpoint.parse::<Config>()?
    } else {
        let (host, port) = parse_host_port(endpoint)?;
        let mut config = Config::new();
        config.host(host).port(port);
        config
    };

    config
        .dbname(&connection.database)
        .application_name(APPLICATION_NAME);
    if let Some(user) = &connection.user {
        config.user(user);
    }
    if let Some(password) = &connection.password {
        config.password(password);
    }
    Ok(config)
}

fn parse_host_port(endpoint: &str) -> Result<(&str, u16), PostgreSQLError> {
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.ends_with(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                PostgreSQLError::Config(format!("Invalid port in endpoint '{endpoint}'"))
            })?;
            Ok((host.trim_start_matches('[').trim_end_matches(']'), port))
        }
        _ if endpoint.is_empty() => Err(PostgreSQLError::Config(
            "endpoint must not be empty".to_string(),
        )),
        _ => Ok((endpoint, DEFAULT_PORT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::config::Host;

    fn connection(endpoint: &str) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: endpoint.to_string(),
            database: "bench".to_string(),
            ca_file: None,
            user: Some("postgres".to_string()),
            password: None,
            table_folder: "pgbench".to_string(),
            pool_size: 10,
        }
    }

    #[test]
    fn test_host_port_endpoint() {
        let config = build_config(&connection("db.internal:6432")).unwrap();
        assert_eq!(config.get_hosts(), &[Host::Tcp("db.internal".to_string())]);
        assert_eq!(config.get_ports(), &[6432]);
        assert_eq!(config.get_dbname(), Some("bench"));
        assert_eq!(config.get_user(), Some("postgres"));
    }

    #[test]
    fn test_default_port() {
        let config = build_config(&connection("localhost")).unwrap();
        assert_eq!(config.get_ports(), &[DEFAULT_PORT]);
    }

    #[test]
    fn test_url_endpoint() {
        let config =
            build_config(&connection("postgresql://admin@10.0.0.5:5433/other")).unwrap();
        assert_eq!(config.get_hosts(), &[Host::Tcp("10.0.0.5".to_string())]);
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_dbname(), Some("bench"));
        assert_eq!(config.get_user(), Some("postgres"));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(
            build_config(&connection("localhost:abc")),
            Err(PostgreSQLError::Config(_))
        ));
    }
}
