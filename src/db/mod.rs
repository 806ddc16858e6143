//! Driver abstraction layer for rowbridge.
//!
//! A `Driver` opens connections; a `DriverConnection` runs exactly one
//! statement at a time and is never shared between tasks. Connections are
//! owned values, so dropping one releases it on every exit path.

mod mock;
mod sqlite;
mod types;

pub use mock::{MockBehavior, MockDriver, MockStats};
pub use sqlite::SqliteDriver;
pub use types::{ColumnInfo, RawResultSet, RawValue, ResultSet, Row, Value};

use crate::config::DatabaseConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Supported driver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverBackend {
    #[default]
    Sqlite,
}

impl DriverBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Creates the driver for the configured database.
///
/// This is the central factory function for drivers.
pub fn driver_for(config: &DatabaseConfig) -> Result<Arc<dyn Driver>> {
    match DriverBackend::from_url(&config.url) {
        Some(DriverBackend::Sqlite) => Ok(Arc::new(SqliteDriver::new(config)?)),
        None => Err(crate::error::BridgeError::config(format!(
            "Unsupported database URL '{}'. Expected a sqlite: URL",
            config.url
        ))),
    }
}

/// Opens dedicated connections to the embedded engine.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name for health reporting.
    fn name(&self) -> &'static str;

    /// Whether the native driver is usable on this host.
    fn is_available(&self) -> bool {
        true
    }

    /// Display-safe description of the target database.
    fn target(&self) -> String;

    /// Opens a new connection owned by the caller.
    async fn connect(&self) -> Result<Box<dyn DriverConnection>>;
}

/// One open connection. Never shared; dropped when its owning task ends.
#[async_trait]
pub trait DriverConnection: Send {
    /// Runs one statement with positional parameters.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<RawResultSet>;

    /// Closes the connection gracefully.
    async fn close(self: Box<Self>) -> Result<()>;
}
