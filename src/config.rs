//! Configuration management for rowbridge.
//!
//! Handles loading the agent configuration from a TOML file and environment
//! variables: database target and timeouts, listen address, the table/column
//! allowlist, coercion policy and accepted credentials.

use crate::auth::CredentialRecord;
use crate::error::{BridgeError, Result};
use crate::query::coerce::{CoercionPolicy, DateMode, NumericMode};
use crate::sql::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for the agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tables and columns descriptors may reference.
    #[serde(default)]
    pub allowlist: AllowlistConfig,

    /// How raw driver values are normalized.
    #[serde(default)]
    pub coercion: CoercionConfig,

    /// Accepted credentials (hashes only, never raw keys).
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., `sqlite:///var/lib/erp/live.db`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Open connections read-only.
    #[serde(default = "default_readonly")]
    pub readonly: bool,

    /// Seconds allowed for opening a connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum seconds per query execution.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Query run by the health probe.
    #[serde(default = "default_test_query")]
    pub test_query: String,

    /// Paging syntax understood by the engine.
    #[serde(default)]
    pub dialect: Dialect,
}

fn default_url() -> String {
    "sqlite://live.db".to_string()
}

fn default_readonly() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    60
}

fn default_test_query() -> String {
    "SELECT 1".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            readonly: default_readonly(),
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
            test_query: default_test_query(),
            dialect: Dialect::default(),
        }
    }
}

impl DatabaseConfig {
    /// Returns a display-safe string for logs and the health probe.
    pub fn display_string(&self) -> String {
        let mode = if self.readonly { "read-only" } else { "read-write" };
        match url::Url::parse(&self.url) {
            Ok(url) if !url.password().unwrap_or_default().is_empty() => {
                let mut redacted = url.clone();
                let _ = redacted.set_password(Some("****"));
                format!("{redacted} ({mode})")
            }
            _ => format!("{} ({mode})", self.url),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Upper bound for `limit`.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_bind() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_max_page_size() -> u32 {
    10_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Allowlisted tables, with optional per-table column lists.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AllowlistConfig {
    /// Table names, matched case-insensitively.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Columns permitted per table. Tables absent here allow every column.
    #[serde(default)]
    pub columns: HashMap<String, Vec<String>>,
}

/// Coercion policy as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoercionConfig {
    /// `digits` keeps `YYYYMMDD` as-is; `iso` rewrites date columns.
    #[serde(default)]
    pub dates: DateMode,

    /// `infer` converts numeric text in numeric columns; `preserve` never does.
    #[serde(default)]
    pub numeric_strings: NumericMode,

    /// Extra column names treated as dates regardless of declared type.
    #[serde(default)]
    pub date_columns: Vec<String>,
}

impl CoercionConfig {
    /// Builds the runtime policy.
    pub fn policy(&self) -> CoercionPolicy {
        CoercionPolicy {
            dates: self.dates,
            numeric_strings: self.numeric_strings,
            date_columns: self
                .date_columns
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rowbridge")
            .join("agent.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            BridgeError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies `ROWBRIDGE_*` environment variables over file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("ROWBRIDGE_BIND") {
            self.agent.bind = bind;
        }
        if let Some(url) = lookup("ROWBRIDGE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secs) = lookup("ROWBRIDGE_QUERY_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.database.query_timeout_secs = secs;
        }
    }

    /// Rejects values that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.database.query_timeout_secs == 0 {
            return Err(BridgeError::config("database.query_timeout_secs must be > 0"));
        }
        if self.database.connect_timeout_secs == 0 {
            return Err(BridgeError::config(
                "database.connect_timeout_secs must be > 0",
            ));
        }
        if self.agent.max_page_size == 0 {
            return Err(BridgeError::config("agent.max_page_size must be > 0"));
        }
        for table in self.allowlist.columns.keys() {
            if !self
                .allowlist
                .tables
                .iter()
                .any(|t| t.eq_ignore_ascii_case(table))
            {
                return Err(BridgeError::config(format!(
                    "allowlist.columns lists '{table}', which is not in allowlist.tables"
                )));
            }
        }
        Ok(())
    }
}
