//! Error types for rowbridge.
//!
//! Defines the main error enum used throughout the agent and the caller-side
//! client, plus the validation errors produced by the allowlist guard.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hint attached to every timeout, since a runaway join looks exactly like a
/// hung driver from the outside.
pub const TIMEOUT_HINT: &str =
    "Check that every join has an equality condition; a missing ON predicate produces a cartesian product.";

/// Reasons a descriptor is rejected before any SQL is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Descriptor joins other tables but does not list columns.
    #[error("Columns required: a query with joins must list alias-qualified columns explicitly")]
    ColumnsRequired,

    /// Table is not present in the allowlist.
    #[error("Table '{0}' is not in the allowed tables")]
    TableNotAllowed(String),

    /// Column is not permitted for its table.
    #[error("Column '{0}' is not in the allowed columns")]
    ColumnNotAllowed(String),

    /// Identifier contains characters outside `[A-Za-z0-9_]`.
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Column must be written as `alias.column` because joins are present.
    #[error("Column '{0}' must be alias-qualified when joins are present")]
    UnqualifiedColumn(String),

    /// Column references an alias that no table in the query declares.
    #[error("Column '{0}' references an unknown table alias")]
    UnknownAlias(String),

    /// Two tables in the query share an alias.
    #[error("Alias '{0}' is declared more than once")]
    DuplicateAlias(String),

    /// Filter value does not fit its operator.
    #[error("Invalid filter on '{column}': {reason}")]
    InvalidFilter { column: String, reason: String },

    /// Join `additional_conditions` is not a conjunction of column equalities.
    #[error("Invalid join condition on '{table}': {reason}")]
    InvalidJoinCondition { table: String, reason: String },

    /// Limit outside `[1, max]`.
    #[error("Limit {limit} is out of range (must be between 1 and {max})")]
    InvalidLimit { limit: i64, max: u32 },

    /// Negative offset.
    #[error("Offset {0} is out of range (must be >= 0)")]
    InvalidOffset(i64),

    /// Compiled statement is not a single SELECT.
    #[error("Only single SELECT statements are permitted: {0}")]
    ReadOnly(String),
}

/// Main error type for rowbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Descriptor rejected locally; never reaches the driver.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Driver could not open a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Execution exceeded the configured ceiling.
    #[error("Query timed out after {seconds} seconds. {hint}")]
    Timeout { seconds: u64, hint: &'static str },

    /// Driver rejected the statement (malformed SQL, type mismatch).
    #[error("Database error: {0}")]
    Driver(String),

    /// Missing, unknown, revoked or expired credential.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Invalid configuration file or values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-side HTTP failure talking to the agent.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed request body.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal errors (unexpected states, task failures).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Failure reported by a remote agent, message kept verbatim.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
}

/// Machine-readable error class carried on the wire next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Connection,
    Timeout,
    Driver,
    Auth,
    Config,
    Transport,
    BadRequest,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Driver => "driver",
            Self::Auth => "auth",
            Self::Config => "config",
            Self::Transport => "transport",
            Self::BadRequest => "bad_request",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl BridgeError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a timeout error carrying the cartesian-product hint.
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout {
            seconds,
            hint: TIMEOUT_HINT,
        }
    }

    /// Creates a timeout error for `limit`, rounding partial seconds up.
    pub fn timeout_after(limit: std::time::Duration) -> Self {
        Self::timeout(limit.as_secs() + u64::from(limit.subsec_nanos() > 0))
    }

    /// Creates a driver error with the given message.
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    /// Creates an authentication error with the given message.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a bad request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Driver(_) => ErrorKind::Driver,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Config(_) => ErrorKind::Config,
            Self::Transport(_) => ErrorKind::Transport,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Remote { kind, .. } => *kind,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::Connection(_) => "Connection Error",
            Self::Timeout { .. } => "Timeout Error",
            Self::Driver(_) => "Database Error",
            Self::Auth(_) => "Authentication Error",
            Self::Config(_) => "Configuration Error",
            Self::Transport(_) => "Transport Error",
            Self::BadRequest(_) => "Bad Request",
            Self::Internal(_) => "Internal Error",
            Self::Remote { .. } => "Agent Error",
        }
    }

    /// Rebuilds an error from a kind and message received over the wire.
    ///
    /// Agents that predate `error_kind` only send the message.
    pub fn from_remote(kind: Option<ErrorKind>, message: String) -> Self {
        Self::Remote {
            kind: kind.unwrap_or(ErrorKind::Internal),
            message,
        }
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
