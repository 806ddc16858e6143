//! HTTP transport between callers and the agent.
//!
//! `server` exposes `POST /query` and `GET /health` with axum; `client` is
//! the caller-side reqwest client. Both share the response envelope below.

pub mod client;
pub mod server;

pub use client::{AgentClient, QueryTransport};
pub use server::{router, AppState};

use serde::{Deserialize, Serialize};

use crate::db::{ResultSet, Row};
use crate::error::{BridgeError, ErrorKind, Result};

/// Body of every `/query` response.
///
/// Success: `{success: true, columns, rows, row_count}`.
/// Failure: `{success: false, error, error_kind}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl QueryResponse {
    pub fn success(result: ResultSet) -> Self {
        Self {
            success: true,
            columns: Some(result.columns),
            rows: Some(result.rows),
            row_count: Some(result.row_count),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(error: &BridgeError) -> Self {
        Self {
            success: false,
            columns: None,
            rows: None,
            row_count: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    /// Converts a received envelope back into a result.
    pub fn into_result(self) -> Result<ResultSet> {
        if !self.success {
            let message = self
                .error
                .unwrap_or_else(|| "Agent reported failure without a message".to_string());
            return Err(BridgeError::from_remote(self.error_kind, message));
        }

        let rows = self.rows.unwrap_or_default();
        let row_count = self.row_count.unwrap_or(rows.len());
        Ok(ResultSet {
            columns: self.columns.unwrap_or_default(),
            rows,
            row_count,
        })
    }
}
