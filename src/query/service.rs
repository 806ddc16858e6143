//! Agent-side query pipeline.
//!
//! validate → build → read-only check → isolated execution → coercion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::coerce::ResultCoercer;
use super::executor::IsolatedExecutor;
use crate::config::Config;
use crate::db::{Driver, ResultSet};
use crate::descriptor::QueryDescriptor;
use crate::error::Result;
use crate::guard::{Allowlist, AllowlistGuard};
use crate::sql::{ensure_single_select, Dialect, Statement, StatementBuilder};

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health probe result, sent as-is by `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub driver_available: bool,
    pub database_connected: bool,
    /// Display-safe database target.
    pub database: String,
    pub test_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Runs descriptors against one database.
#[derive(Clone)]
pub struct QueryService {
    guard: AllowlistGuard,
    builder: StatementBuilder,
    executor: IsolatedExecutor,
    coercer: ResultCoercer,
    test_query: String,
}

impl QueryService {
    pub fn new(
        guard: AllowlistGuard,
        builder: StatementBuilder,
        executor: IsolatedExecutor,
        coercer: ResultCoercer,
        test_query: impl Into<String>,
    ) -> Self {
        Self {
            guard,
            builder,
            executor,
            coercer,
            test_query: test_query.into(),
        }
    }

    /// Assembles the pipeline from configuration and a driver.
    pub fn from_config(config: &Config, driver: Arc<dyn Driver>) -> Self {
        let allowlist = Arc::new(Allowlist::from_config(&config.allowlist));
        Self::new(
            AllowlistGuard::new(allowlist, config.agent.max_page_size),
            StatementBuilder::new(config.database.dialect),
            IsolatedExecutor::new(
                driver,
                Duration::from_secs(config.database.query_timeout_secs),
            ),
            ResultCoercer::new(config.coercion.policy()),
            config.database.test_query.clone(),
        )
    }

    pub fn guard(&self) -> &AllowlistGuard {
        &self.guard
    }

    pub fn dialect(&self) -> Dialect {
        self.builder.dialect()
    }

    /// Validates, compiles and executes one descriptor.
    pub async fn run(&self, descriptor: QueryDescriptor) -> Result<ResultSet> {
        let started = Instant::now();
        let table = descriptor.table.clone();

        let validated = self.guard.validate(descriptor)?;
        let statement = self.builder.build(&validated);
        ensure_single_select(&statement.sql, self.builder.dialect())?;

        let raw = self.executor.execute(statement).await?;
        let result = self.coercer.coerce(raw);

        info!(
            table = %table,
            rows = result.row_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query served"
        );
        Ok(result)
    }

    /// Opens a dedicated connection and runs the configured test query.
    pub async fn health(&self) -> HealthReport {
        let driver = self.executor.driver();
        let mut report = HealthReport {
            status: HealthStatus::Unhealthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            driver_available: driver.is_available(),
            database_connected: false,
            database: driver.target(),
            test_query: self.test_query.clone(),
            message: None,
        };

        if !report.driver_available {
            report.message = Some(format!("The {} driver is not available on this host", driver.name()));
            return report;
        }

        if let Err(e) = ensure_single_select(&self.test_query, self.builder.dialect()) {
            report.message = Some(format!("Test query rejected: {e}"));
            return report;
        }

        let statement = Statement {
            sql: self.test_query.clone(),
            params: Vec::new(),
            skip: 0,
        };
        match self.executor.execute(statement).await {
            Ok(_) => {
                report.status = HealthStatus::Healthy;
                report.database_connected = true;
            }
            Err(e) => {
                debug!("Health probe failed: {e}");
                report.message = Some(e.to_string());
            }
        }
        report
    }
}
