//! SQL compilation for validated descriptors.
//!
//! `builder` turns a [`ValidatedQuery`](crate::guard::ValidatedQuery) into
//! parameterized SQL; `readonly` re-parses the result and refuses anything
//! that is not a single SELECT.

pub mod builder;
pub mod readonly;

pub use builder::{Statement, StatementBuilder};
pub use readonly::ensure_single_select;

use serde::{Deserialize, Serialize};

/// Paging syntax understood by the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `LIMIT n OFFSET m` (SQLite and most modern engines).
    #[default]
    LimitOffset,

    /// `SELECT TOP n`; the offset is skipped client-side.
    Top,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LimitOffset => "limit_offset",
            Self::Top => "top",
        }
    }
}
