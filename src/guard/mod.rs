//! Allowlist validation for query descriptors.
//!
//! Checks a descriptor against the configured tables and columns before any
//! SQL exists. Pure: no I/O, no shared mutable state. The only way to obtain
//! a [`ValidatedQuery`] (which the statement builder requires) is through
//! [`AllowlistGuard::validate`].

use crate::config::AllowlistConfig;
use crate::descriptor::{FilterCondition, FilterValue, QueryDescriptor};
use crate::error::ValidationError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

fn and_separator() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\s+AND\s+").expect("static pattern"))
}

/// Checks a bare identifier (table, alias or column name).
pub fn check_identifier(name: &str) -> Result<(), ValidationError> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier(name.to_string()))
    }
}

/// A column reference, optionally qualified with a table alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    /// Parses `column` or `alias.column`, validating both parts.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let mut parts = raw.split('.');
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(ValidationError::InvalidIdentifier(raw.to_string()));
        }

        match second {
            Some(name) => {
                check_identifier(first).map_err(|_| ValidationError::InvalidIdentifier(raw.to_string()))?;
                check_identifier(name).map_err(|_| ValidationError::InvalidIdentifier(raw.to_string()))?;
                Ok(Self {
                    qualifier: Some(first.to_string()),
                    name: name.to_string(),
                })
            }
            None => {
                check_identifier(first)?;
                Ok(Self {
                    qualifier: None,
                    name: first.to_string(),
                })
            }
        }
    }

    /// Renders the reference as SQL text.
    pub fn to_sql(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct TableRule {
    columns: Option<HashSet<String>>,
}

/// Tables (and optionally columns) that descriptors may reference.
///
/// Names are stored lowercased; every lookup is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    tables: HashMap<String, TableRule>,
}

impl Allowlist {
    /// Allows every column of the given tables.
    pub fn new<S: AsRef<str>>(tables: impl IntoIterator<Item = S>) -> Self {
        let tables = tables
            .into_iter()
            .map(|t| (t.as_ref().to_lowercase(), TableRule { columns: None }))
            .collect();
        Self { tables }
    }

    /// Restricts `table` to the given columns, adding the table if needed.
    pub fn with_columns<S: AsRef<str>>(
        mut self,
        table: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();
        self.tables.insert(
            table.to_lowercase(),
            TableRule {
                columns: Some(columns),
            },
        );
        self
    }

    /// Builds the allowlist from configuration.
    pub fn from_config(config: &AllowlistConfig) -> Self {
        let mut allowlist = Self::new(&config.tables);
        for (table, columns) in &config.columns {
            allowlist = allowlist.with_columns(table, columns);
        }
        allowlist
    }

    /// True if the table is allowlisted.
    pub fn allows_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    /// True if the column is allowed for the (allowlisted) table.
    pub fn allows_column(&self, table: &str, column: &str) -> bool {
        match self.tables.get(&table.to_lowercase()) {
            Some(TableRule { columns: None }) => true,
            Some(TableRule {
                columns: Some(columns),
            }) => columns.contains(&column.to_lowercase()),
            None => false,
        }
    }

    /// Allowlisted table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A descriptor that passed validation, with paging resolved and join
/// conditions parsed into equality pairs.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    descriptor: QueryDescriptor,
    join_conditions: Vec<Vec<(ColumnRef, ColumnRef)>>,
    limit: u32,
    offset: u64,
}

impl ValidatedQuery {
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Equalities for the join at `index`, the `on_left = on_right` pair first.
    pub fn join_conditions(&self, index: usize) -> &[(ColumnRef, ColumnRef)] {
        self.join_conditions
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Validates descriptors against a shared, read-only allowlist.
#[derive(Debug, Clone)]
pub struct AllowlistGuard {
    allowlist: Arc<Allowlist>,
    max_page_size: u32,
}

impl AllowlistGuard {
    pub fn new(allowlist: Arc<Allowlist>, max_page_size: u32) -> Self {
        Self {
            allowlist,
            max_page_size,
        }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Validates a descriptor. See [`validate`].
    pub fn validate(&self, descriptor: QueryDescriptor) -> Result<ValidatedQuery, ValidationError> {
        validate(descriptor, &self.allowlist, self.max_page_size)
    }
}

/// Tables visible in one query: (reference name lowercased, table name).
struct Scope<'a> {
    entries: Vec<(String, &'a str)>,
    has_joins: bool,
}

impl<'a> Scope<'a> {
    fn resolve(&self, column: &ColumnRef, raw: &str) -> Result<&'a str, ValidationError> {
        match &column.qualifier {
            Some(q) => {
                let q = q.to_lowercase();
                self.entries
                    .iter()
                    .find(|(name, _)| *name == q)
                    .map(|(_, table)| *table)
                    .ok_or_else(|| ValidationError::UnknownAlias(raw.to_string()))
            }
            None if self.has_joins => Err(ValidationError::UnqualifiedColumn(raw.to_string())),
            None => Ok(self.entries[0].1),
        }
    }
}

/// Validates `descriptor` against `allowlist`.
///
/// Checks run in this order: explicit columns with joins, identifier syntax
/// and table allowlisting, alias uniqueness, every column reference, filter
/// value shapes, paging bounds. The first failure is returned.
pub fn validate(
    descriptor: QueryDescriptor,
    allowlist: &Allowlist,
    max_page_size: u32,
) -> Result<ValidatedQuery, ValidationError> {
    // "All columns" only returns the primary table; with joins that would
    // silently drop the joined data.
    if !descriptor.joins.is_empty() && descriptor.selects_all() {
        return Err(ValidationError::ColumnsRequired);
    }

    check_table(&descriptor.table, allowlist)?;
    if let Some(alias) = &descriptor.alias {
        check_identifier(alias)?;
    }
    for join in &descriptor.joins {
        check_table(&join.table, allowlist)?;
        if let Some(alias) = &join.alias {
            check_identifier(alias)?;
        }
    }

    let mut entries: Vec<(String, &str)> = Vec::with_capacity(descriptor.joins.len() + 1);
    entries.push((
        descriptor.reference_name().to_lowercase(),
        descriptor.table.as_str(),
    ));
    for join in &descriptor.joins {
        let name = join.reference_name().to_lowercase();
        if entries.iter().any(|(existing, _)| *existing == name) {
            return Err(ValidationError::DuplicateAlias(join.reference_name().to_string()));
        }
        entries.push((name, join.table.as_str()));
    }
    let scope = Scope {
        entries,
        has_joins: !descriptor.joins.is_empty(),
    };

    if let Some(columns) = &descriptor.columns {
        for column in columns {
            check_column(column, &scope, allowlist)?;
        }
    }

    let mut join_conditions = Vec::with_capacity(descriptor.joins.len());
    for join in &descriptor.joins {
        let mut pairs = vec![(
            check_column(&join.on_left, &scope, allowlist)?,
            check_column(&join.on_right, &scope, allowlist)?,
        )];
        if let Some(extra) = &join.additional_conditions {
            for (left, right) in parse_additional_conditions(&join.table, extra)? {
                pairs.push((
                    check_column(&left, &scope, allowlist)?,
                    check_column(&right, &scope, allowlist)?,
                ));
            }
        }
        join_conditions.push(pairs);
    }

    for filter in &descriptor.filters {
        check_column(&filter.column, &scope, allowlist)?;
        check_filter_value(filter)?;
    }

    for order in &descriptor.order_by {
        check_column(&order.column, &scope, allowlist)?;
    }

    let limit = match descriptor.limit {
        None => max_page_size,
        Some(l) if l >= 1 && l <= i64::from(max_page_size) => l as u32,
        Some(l) => {
            return Err(ValidationError::InvalidLimit {
                limit: l,
                max: max_page_size,
            })
        }
    };
    let offset = match descriptor.offset {
        None => 0,
        Some(o) if o >= 0 => o as u64,
        Some(o) => return Err(ValidationError::InvalidOffset(o)),
    };

    Ok(ValidatedQuery {
        descriptor,
        join_conditions,
        limit,
        offset,
    })
}

fn check_table(table: &str, allowlist: &Allowlist) -> Result<(), ValidationError> {
    check_identifier(table)?;
    if allowlist.allows_table(table) {
        Ok(())
    } else {
        Err(ValidationError::TableNotAllowed(table.to_string()))
    }
}

fn check_column(raw: &str, scope: &Scope<'_>, allowlist: &Allowlist) -> Result<ColumnRef, ValidationError> {
    let column = ColumnRef::parse(raw)?;
    let table = scope.resolve(&column, raw)?;
    if allowlist.allows_column(table, &column.name) {
        Ok(column)
    } else {
        Err(ValidationError::ColumnNotAllowed(format!("{table}.{}", column.name)))
    }
}

/// Splits `a.x = b.y AND a.z = b.w` into column pairs.
///
/// Only equalities between column references are accepted; literals,
/// `OR`, parentheses and functions all fail identifier validation.
fn parse_additional_conditions(table: &str, raw: &str) -> Result<Vec<(String, String)>, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidJoinCondition {
        table: table.to_string(),
        reason: reason.to_string(),
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    and_separator()
        .split(raw)
        .map(|part| {
            let mut sides = part.split('=');
            match (sides.next(), sides.next(), sides.next()) {
                (Some(left), Some(right), None) => {
                    let (left, right) = (left.trim(), right.trim());
                    ColumnRef::parse(left).map_err(|_| invalid(&format!("'{left}' is not a column reference")))?;
                    ColumnRef::parse(right).map_err(|_| invalid(&format!("'{right}' is not a column reference")))?;
                    Ok((left.to_string(), right.to_string()))
                }
                _ => Err(invalid(&format!(
                    "'{}' is not an equality between two columns",
                    part.trim()
                ))),
            }
        })
        .collect()
}

fn check_filter_value(filter: &FilterCondition) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidFilter {
        column: filter.column.clone(),
        reason: reason.to_string(),
    };
    let op = filter.operator;

    if op.takes_no_value() {
        return match &filter.value {
            None | Some(FilterValue::One(crate::db::Value::Null)) => Ok(()),
            Some(_) => Err(invalid(&format!("{op} takes no value"))),
        };
    }

    if op.takes_list() {
        return match &filter.value {
            Some(FilterValue::Many(values)) if values.is_empty() => {
                Err(invalid(&format!("{op} requires at least one value")))
            }
            Some(FilterValue::Many(values)) if values.iter().any(|v| v.is_null()) => {
                Err(invalid(&format!("{op} list cannot contain null")))
            }
            Some(FilterValue::Many(_)) => Ok(()),
            _ => Err(invalid(&format!("{op} operator requires a list value"))),
        };
    }

    match &filter.value {
        Some(FilterValue::One(v)) if !v.is_null() => Ok(()),
        Some(FilterValue::One(_)) | None => Err(invalid(&format!(
            "{op} requires a value; use IS NULL to match nulls"
        ))),
        Some(FilterValue::Many(_)) => Err(invalid(&format!("{op} requires a single value"))),
    }
}
