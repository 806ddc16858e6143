//! SQLite driver implementation.
//!
//! Provides the `SqliteDriver` struct that implements the `Driver` trait
//! using sqlx. Every `connect` opens a fresh `SqliteConnection`, which sqlx
//! runs on its own dedicated worker thread, so one connection always belongs
//! to exactly one execution unit.

use crate::config::DatabaseConfig;
use crate::db::{ColumnInfo, Driver, DriverConnection, RawResultSet, RawValue, Value};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as SqlxColumn, ConnectOptions, Connection, Executor, Row as SqlxRow};
use sqlx::{TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// SQLite driver.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    options: SqliteConnectOptions,
    target: String,
    connect_timeout: Duration,
}

impl SqliteDriver {
    /// Creates a driver from the database configuration.
    ///
    /// Nothing is opened here; connections are created per statement.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| BridgeError::config(format!("Invalid database URL: {e}")))?
            .read_only(config.readonly)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(config.connect_timeout_secs));

        Ok(Self {
            options,
            target: config.display_string(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        let conn = tokio::time::timeout(self.connect_timeout, self.options.connect())
            .await
            .map_err(|_| {
                BridgeError::connection(format!(
                    "Connecting to {} timed out after {} seconds",
                    self.target,
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| map_connection_error(e, &self.target))?;

        debug!("Opened dedicated connection to {}", self.target);
        Ok(Box::new(SqliteDriverConnection { conn }))
    }
}

/// A single open SQLite connection.
struct SqliteDriverConnection {
    conn: SqliteConnection,
}

#[async_trait]
impl DriverConnection for SqliteDriverConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<RawResultSet> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.as_str()),
            };
        }

        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| BridgeError::driver(format_driver_error(e)))?;

        let columns: Vec<ColumnInfo> = match rows.first() {
            Some(first) => first
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            // No rows to read metadata from; ask the prepared statement instead.
            None => (&mut self.conn)
                .describe(sql)
                .await
                .map(|describe| {
                    describe
                        .columns()
                        .iter()
                        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                        .collect()
                })
                .unwrap_or_default(),
        };

        Ok(RawResultSet {
            columns,
            rows: rows.iter().map(convert_row).collect(),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| BridgeError::connection(format!("Failed to close connection: {e}")))
    }
}

/// Converts a sqlx SqliteRow to raw values.
fn convert_row(row: &SqliteRow) -> Vec<RawValue> {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts one cell, dispatching on the storage class of the value itself.
///
/// SQLite is dynamically typed: a column declared `INTEGER` may still hold
/// text, so the declared type is not trusted here.
fn convert_value(row: &SqliteRow, index: usize) -> RawValue {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return RawValue::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return RawValue::Null,
    };

    match storage.as_str() {
        "INTEGER" | "INT8" | "BIGINT" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(RawValue::Integer)
            .unwrap_or(RawValue::Null),

        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get::<f64, _>(index)
            .map(RawValue::Real)
            .unwrap_or(RawValue::Null),

        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(RawValue::Blob)
            .unwrap_or(RawValue::Null),

        _ => row
            .try_get::<String, _>(index)
            .map(RawValue::Text)
            .unwrap_or(RawValue::Null),
    }
}

/// Maps sqlx connection errors to actionable messages.
fn map_connection_error(error: sqlx::Error, target: &str) -> BridgeError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("unable to open") || error_str.contains("no such file") {
        BridgeError::connection(format!(
            "Cannot open database {target}. Check that the file exists and is readable."
        ))
    } else if error_str.contains("locked") || error_str.contains("busy") {
        BridgeError::connection(format!(
            "Database {target} is locked by another process. Try again later."
        ))
    } else {
        BridgeError::connection(format!("Cannot connect to {target}: {error}"))
    }
}

/// Formats a driver error, keeping the engine's own message verbatim.
fn format_driver_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
