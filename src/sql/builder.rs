//! Builds parameterized SELECT statements.
//!
//! Identifiers were already checked by the guard, so they are written as-is.
//! Filter values are never written into the SQL text: each one becomes a `?`
//! placeholder with the value carried in [`Statement::params`].

use super::Dialect;
use crate::db::Value;
use crate::descriptor::{FilterCondition, FilterValue};
use crate::guard::ValidatedQuery;

/// A compiled statement ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,

    /// Bound parameters, in placeholder order.
    pub params: Vec<Value>,

    /// Leading rows the executor discards (TOP dialect offset emulation).
    pub skip: u64,
}

/// Compiles validated queries for one dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementBuilder {
    dialect: Dialect,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Compiles `query` into SQL plus bound parameters.
    pub fn build(&self, query: &ValidatedQuery) -> Statement {
        let descriptor = query.descriptor();
        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();

        let skip = match self.dialect {
            Dialect::LimitOffset => 0,
            Dialect::Top => {
                let fetch = u64::from(query.limit()) + query.offset();
                sql.push_str(&format!("TOP {fetch} "));
                query.offset()
            }
        };

        match &descriptor.columns {
            Some(columns) if !columns.is_empty() => sql.push_str(&columns.join(", ")),
            _ => sql.push('*'),
        }

        sql.push_str(" FROM ");
        sql.push_str(&descriptor.table);
        if let Some(alias) = &descriptor.alias {
            sql.push(' ');
            sql.push_str(alias);
        }

        for (index, join) in descriptor.joins.iter().enumerate() {
            sql.push(' ');
            sql.push_str(join.join_type.as_sql());
            sql.push(' ');
            sql.push_str(&join.table);
            if let Some(alias) = &join.alias {
                sql.push(' ');
                sql.push_str(alias);
            }
            let conditions: Vec<String> = query
                .join_conditions(index)
                .iter()
                .map(|(left, right)| format!("{} = {}", left.to_sql(), right.to_sql()))
                .collect();
            sql.push_str(" ON ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !descriptor.filters.is_empty() {
            let clauses: Vec<String> = descriptor
                .filters
                .iter()
                .map(|filter| filter_clause(filter, &mut params))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !descriptor.order_by.is_empty() {
            let orders: Vec<String> = descriptor
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if self.dialect == Dialect::LimitOffset {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", query.limit(), query.offset()));
        }

        Statement { sql, params, skip }
    }
}

/// Renders one condition, pushing its values onto `params`.
fn filter_clause(filter: &FilterCondition, params: &mut Vec<Value>) -> String {
    let op = filter.operator;
    if op.takes_no_value() {
        return format!("{} {}", filter.column, op.as_sql());
    }

    match &filter.value {
        Some(FilterValue::Many(values)) => {
            let placeholders = vec!["?"; values.len()].join(", ");
            params.extend(values.iter().cloned());
            format!("{} {} ({placeholders})", filter.column, op.as_sql())
        }
        Some(FilterValue::One(value)) => {
            params.push(value.clone());
            format!("{} {} ?", filter.column, op.as_sql())
        }
        None => {
            params.push(Value::Null);
            format!("{} {} ?", filter.column, op.as_sql())
        }
    }
}
