//! Isolated statement execution.
//!
//! Every statement gets its own connection, owned by its own spawned task.
//! The caller waits on the task's handle under a timeout; when the timeout
//! fires the handle is dropped, which detaches the task without cancelling
//! it. The task finishes in the background, releases its connection and its
//! result is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::db::{Driver, RawResultSet};
use crate::error::{BridgeError, Result};
use crate::sql::Statement;

/// Runs statements on dedicated connections with a time ceiling.
#[derive(Clone)]
pub struct IsolatedExecutor {
    driver: Arc<dyn Driver>,
    timeout: Duration,
}

impl IsolatedExecutor {
    pub fn new(driver: Arc<dyn Driver>, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes `statement` with the configured timeout.
    pub async fn execute(&self, statement: Statement) -> Result<RawResultSet> {
        self.execute_with_timeout(statement, self.timeout).await
    }

    /// Executes `statement` on a fresh connection, waiting at most `timeout`.
    pub async fn execute_with_timeout(
        &self,
        statement: Statement,
        timeout: Duration,
    ) -> Result<RawResultSet> {
        let driver = Arc::clone(&self.driver);
        let started = Instant::now();
        debug!(sql = %statement.sql, params = statement.params.len(), "Executing statement");

        let handle = tokio::spawn(async move {
            let outcome = run_on_dedicated_connection(driver.as_ref(), &statement).await;
            if let Err(e) = &outcome {
                debug!("Statement finished with error: {e}");
            }
            outcome
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Statement finished");
                outcome
            }
            Ok(Err(join_error)) => Err(BridgeError::internal(format!(
                "Execution task failed: {join_error}"
            ))),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Statement timed out; execution detached and its result will be discarded"
                );
                Err(BridgeError::timeout_after(timeout))
            }
        }
    }
}

/// Opens a connection, runs one statement, and releases the connection.
///
/// The connection is dropped on the error path and closed explicitly on the
/// success path.
async fn run_on_dedicated_connection(driver: &dyn Driver, statement: &Statement) -> Result<RawResultSet> {
    let mut conn = driver.connect().await?;
    let mut result = conn.query(&statement.sql, &statement.params).await?;

    if let Err(e) = conn.close().await {
        debug!("Ignoring error while closing connection: {e}");
    }

    if statement.skip > 0 {
        let skip = usize::try_from(statement.skip).unwrap_or(usize::MAX);
        result.rows.drain(..skip.min(result.rows.len()));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, MockBehavior, MockDriver, RawValue, Value};

    fn statement(sql: &str) -> Statement {
        Statement {
            sql: sql.to_string(),
            params: vec![Value::from("1001")],
            skip: 0,
        }
    }

    fn rows(n: i64) -> RawResultSet {
        RawResultSet::with_data(
            vec![ColumnInfo::new("n", "INTEGER")],
            (0..n).map(|i| vec![RawValue::Integer(i)]).collect(),
        )
    }

    #[tokio::test]
    async fn test_execute_returns_rows_and_releases_connection() {
        let driver = MockDriver::new(rows(3));
        let stats = driver.stats();
        let executor = IsolatedExecutor::new(Arc::new(driver), Duration::from_secs(5));

        let result = executor.execute(statement("SELECT n FROM t WHERE id = ?")).await.unwrap();

        assert_eq!(result.rows.len(), 3);
        assert_eq!(stats.opened(), 1);
        assert_eq!(stats.closed(), 1);
        assert_eq!(stats.statements()[0].1, vec![Value::from("1001")]);
    }

    #[tokio::test]
    async fn test_each_execution_gets_its_own_connection() {
        let driver = MockDriver::new(rows(1));
        let stats = driver.stats();
        let executor = IsolatedExecutor::new(Arc::new(driver), Duration::from_secs(5));

        for _ in 0..3 {
            executor.execute(statement("SELECT n FROM t")).await.unwrap();
        }
        assert_eq!(stats.opened(), 3);
        assert_eq!(stats.open_now(), 0);
    }

    #[tokio::test]
    async fn test_skip_discards_leading_rows() {
        let executor = IsolatedExecutor::new(Arc::new(MockDriver::new(rows(5))), Duration::from_secs(5));
        let mut stmt = statement("SELECT TOP 5 n FROM t");
        stmt.skip = 3;

        let result = executor.execute(stmt).await.unwrap();
        assert_eq!(result.rows, vec![vec![RawValue::Integer(3)], vec![RawValue::Integer(4)]]);

        let mut stmt = statement("SELECT TOP 5 n FROM t");
        stmt.skip = 10;
        assert!(executor.execute(stmt).await.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_detaches_and_connection_is_released_later() {
        let driver = MockDriver::with_behavior(MockBehavior::Slow {
            delay: Duration::from_millis(300),
            result: rows(1),
        });
        let stats = driver.stats();
        let executor = IsolatedExecutor::new(Arc::new(driver), Duration::from_millis(50));

        for run in 1..=3 {
            let started = Instant::now();
            let err = executor.execute(statement("SELECT n FROM t")).await.unwrap_err();

            assert!(matches!(err, BridgeError::Timeout { seconds: 1, .. }));
            assert!(err.to_string().contains("timed out after 1 seconds"));
            assert!(err.to_string().contains("cartesian product"));
            assert!(started.elapsed() < Duration::from_millis(250));
            assert_eq!(stats.opened(), run);
            assert!(stats.open_now() >= 1);
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stats.opened(), 3);
        assert_eq!(stats.closed(), 3);
        assert_eq!(stats.open_now(), 0);
    }

    #[tokio::test]
    async fn test_driver_error_releases_connection() {
        let driver = MockDriver::with_behavior(MockBehavior::Fail("no such column: nme".into()));
        let stats = driver.stats();
        let executor = IsolatedExecutor::new(Arc::new(driver), Duration::from_secs(5));

        let err = executor.execute(statement("SELECT nme FROM t")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Driver(_)));
        assert_eq!(err.to_string(), "Database error: no such column: nme");
        assert_eq!(stats.closed(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_not_retried() {
        let driver = MockDriver::with_behavior(MockBehavior::RefuseConnection("DSN missing".into()));
        let stats = driver.stats();
        let executor = IsolatedExecutor::new(Arc::new(driver), Duration::from_secs(5));

        let err = executor.execute(statement("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
        assert_eq!(stats.opened(), 0);
        assert_eq!(stats.statements().len(), 0);
    }
}
