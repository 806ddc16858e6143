//! Mock driver for testing.
//!
//! Returns scripted results and counts every connection it hands out, so
//! tests can assert that each one is released even after a timeout.

use super::{ColumnInfo, Driver, DriverConnection, RawResultSet, RawValue, Value};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock does when a statement runs.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this result for every statement.
    Rows(RawResultSet),
    /// Sleep, then return the result. Used to trigger timeouts.
    Slow {
        delay: Duration,
        result: RawResultSet,
    },
    /// Fail while opening the connection.
    RefuseConnection(String),
    /// Open fine, fail the statement.
    Fail(String),
}

/// Connection and statement counters shared with the test.
#[derive(Debug, Default)]
pub struct MockStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockStats {
    /// Connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections released so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections currently held open.
    pub fn open_now(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    /// Every statement received, with its bound parameters.
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// A mock driver that returns predefined results.
pub struct MockDriver {
    behavior: MockBehavior,
    stats: Arc<MockStats>,
}

impl MockDriver {
    /// Creates a mock that answers every statement with `result`.
    pub fn new(result: RawResultSet) -> Self {
        Self::with_behavior(MockBehavior::Rows(result))
    }

    /// Creates a mock with the given behavior.
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Creates a mock returning a single text column with the given rows.
    pub fn with_text_rows(column: &str, values: &[&str]) -> Self {
        let rows = values
            .iter()
            .map(|v| vec![RawValue::Text(v.to_string())])
            .collect();
        Self::new(RawResultSet::with_data(
            vec![ColumnInfo::new(column, "TEXT")],
            rows,
        ))
    }

    /// Handle to the counters, usable after the driver is moved.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new(RawResultSet::default())
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn target(&self) -> String {
        "mock database".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        if let MockBehavior::RefuseConnection(msg) = &self.behavior {
            return Err(BridgeError::connection(msg.clone()));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            behavior: self.behavior.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockConnection {
    behavior: MockBehavior,
    stats: Arc<MockStats>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<RawResultSet> {
        if let Ok(mut statements) = self.stats.statements.lock() {
            statements.push((sql.to_string(), params.to_vec()));
        }

        match &self.behavior {
            MockBehavior::Rows(result) => Ok(result.clone()),
            MockBehavior::Slow { delay, result } => {
                tokio::time::sleep(*delay).await;
                Ok(result.clone())
            }
            MockBehavior::Fail(msg) => Err(BridgeError::driver(msg.clone())),
            MockBehavior::RefuseConnection(msg) => Err(BridgeError::connection(msg.clone())),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
