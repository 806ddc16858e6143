//! Batched lookup of child rows for many parents.
//!
//! Instead of one query per parent id, the template's foreign-key filter is
//! rewritten to a single `IN` over every id and the flat result is grouped
//! back by foreign key.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::db::{Row, Value};
use crate::descriptor::{FilterCondition, FilterOperator, QueryDescriptor};
use crate::error::{BridgeError, Result};
use crate::transport::QueryTransport;

/// Child rows grouped by parent id.
///
/// Ids are normalized with [`Value::key`], so `1`, `1.0` and `"1"` all find
/// the same group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedRows {
    pub columns: Vec<String>,
    groups: HashMap<String, Vec<Row>>,
}

impl RelatedRows {
    /// Rows for `parent_id`, if any came back.
    pub fn get(&self, parent_id: impl Into<Value>) -> Option<&[Row]> {
        let key = parent_id.into().key()?;
        self.groups.get(&key).map(Vec::as_slice)
    }

    /// Number of parents with at least one row.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Normalized parent ids present, sorted.
    pub fn parent_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn into_map(self) -> HashMap<String, Vec<Row>> {
        self.groups
    }
}

/// Row ceiling for a batch whose template sets no limit.
pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// Runs batched lookups over any transport.
pub struct BatchAssembler<'a> {
    transport: &'a dyn QueryTransport,
    max_rows: u32,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(transport: &'a dyn QueryTransport) -> Self {
        Self {
            transport,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Sets the row ceiling used when the template has no `limit`.
    ///
    /// One probe row is requested on top of the ceiling, so it must stay
    /// below the agent's `max_page_size`.
    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    /// Fetches the rows of `template` belonging to each of `parent_ids`.
    ///
    /// An empty id set returns an empty result without querying. The query
    /// asks for one row beyond the template's `limit` (or the assembler's
    /// ceiling); if that row comes back the batch is incomplete and an error
    /// is returned instead of partial groups.
    pub async fn fetch_related<V: Into<Value>>(
        &self,
        parent_ids: impl IntoIterator<Item = V>,
        template: &QueryDescriptor,
        fk_column: &str,
    ) -> Result<RelatedRows> {
        let mut seen = HashSet::new();
        let ids: Vec<Value> = parent_ids
            .into_iter()
            .map(Into::into)
            .filter(|v: &Value| v.key().is_some_and(|k| seen.insert(k)))
            .collect();

        if ids.is_empty() {
            debug!(table = %template.table, "No parent ids; skipping query");
            return Ok(RelatedRows::default());
        }

        if let Some(columns) = template.columns.as_ref().filter(|c| !c.is_empty()) {
            if !columns.iter().any(|c| same_column(c, fk_column)) {
                return Err(BridgeError::bad_request(format!(
                    "Foreign key column '{fk_column}' must be among the selected columns"
                )));
            }
        }

        let mut descriptor = template.clone();
        descriptor.filters.retain(|f| {
            !(same_column(&f.column, fk_column)
                && matches!(f.operator, FilterOperator::Eq | FilterOperator::In))
        });
        let requested = ids.len();
        descriptor.filters.push(FilterCondition::is_in(fk_column, ids));
        let ceiling = template.limit.unwrap_or(i64::from(self.max_rows));
        descriptor.limit = Some(ceiling.saturating_add(1));

        let result = self.transport.query(&descriptor).await?;
        if result.row_count as i64 > ceiling {
            warn!(
                table = %template.table,
                ceiling,
                parents = requested,
                "Batched result exceeded the row ceiling"
            );
            return Err(BridgeError::bad_request(format!(
                "Batched lookup on '{}' for {requested} parents returned more than {ceiling} rows; \
                 split the parent ids or raise the limit",
                template.table
            )));
        }

        let index = result.column_index(fk_column).ok_or_else(|| {
            BridgeError::bad_request(format!(
                "Foreign key column '{fk_column}' is not in the result"
            ))
        })?;

        let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
        for row in result.rows {
            if let Some(key) = row.get(index).and_then(Value::key) {
                groups.entry(key).or_default().push(row);
            }
        }
        debug!(parents = requested, matched = groups.len(), "Assembled batch");

        Ok(RelatedRows {
            columns: result.columns,
            groups,
        })
    }
}

/// Compares column references by their final segment, case-insensitively.
fn same_column(a: &str, b: &str) -> bool {
    let tail = |s: &str| s.rsplit('.').next().unwrap_or(s).to_string();
    a.eq_ignore_ascii_case(b) || tail(a).eq_ignore_ascii_case(&tail(b))
}
