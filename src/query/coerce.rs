//! Normalization of raw driver values into wire values.
//!
//! Fixed-width text is right-trimmed, the `18991230` "no date" sentinel
//! becomes null, dates are optionally rewritten as ISO and numeric text in
//! numeric columns is optionally converted. Coercion never fails: a value
//! that cannot be converted is passed through and logged once per column.

use crate::db::{ColumnInfo, RawResultSet, RawValue, ResultSet, Row, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::warn;

/// Date the legacy engine stores for "no date".
pub const NULL_DATE_SENTINEL: &str = "18991230";

const NULL_DATE_SENTINEL_INT: i64 = 18_991_230;

/// How 8-digit dates are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    /// Keep `YYYYMMDD` as stored.
    #[default]
    Digits,
    /// Rewrite date columns as `YYYY-MM-DD`.
    Iso,
}

/// Whether numeric text in numeric columns becomes a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericMode {
    #[default]
    Infer,
    Preserve,
}

/// Runtime coercion settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoercionPolicy {
    pub dates: DateMode,
    pub numeric_strings: NumericMode,
    /// Lowercased column names treated as dates whatever their declared type.
    pub date_columns: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Anomaly {
    BadNumber,
    BadDate,
    NonFinite,
}

/// Converts raw driver rows into transport-safe rows.
#[derive(Debug, Clone, Default)]
pub struct ResultCoercer {
    policy: CoercionPolicy,
}

impl ResultCoercer {
    pub fn new(policy: CoercionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CoercionPolicy {
        &self.policy
    }

    /// Coerces a whole result set. Anomalies are logged once per column.
    pub fn coerce(&self, raw: RawResultSet) -> ResultSet {
        let mut warned = HashSet::new();
        let rows: Vec<Row> = raw
            .rows
            .into_iter()
            .map(|row| self.coerce_row_inner(row, &raw.columns, &mut warned))
            .collect();
        let columns = raw.columns.into_iter().map(|c| c.name).collect();
        ResultSet::new(columns, rows)
    }

    /// Coerces one row against its column metadata.
    pub fn coerce_row(&self, row: Vec<RawValue>, columns: &[ColumnInfo]) -> Row {
        self.coerce_row_inner(row, columns, &mut HashSet::new())
    }

    fn coerce_row_inner(
        &self,
        row: Vec<RawValue>,
        columns: &[ColumnInfo],
        warned: &mut HashSet<(usize, Anomaly)>,
    ) -> Row {
        row.into_iter()
            .enumerate()
            .map(|(index, value)| {
                let column = columns.get(index);
                self.coerce_value(value, index, column, warned)
            })
            .collect()
    }

    fn is_date_column(&self, column: Option<&ColumnInfo>) -> bool {
        column.is_some_and(|c| {
            let name = c.name.rsplit('.').next().unwrap_or(&c.name).to_lowercase();
            c.is_date() || self.policy.date_columns.contains(&name)
        })
    }

    fn coerce_value(
        &self,
        value: RawValue,
        index: usize,
        column: Option<&ColumnInfo>,
        warned: &mut HashSet<(usize, Anomaly)>,
    ) -> Value {
        let is_date = self.is_date_column(column);
        let mut report = |anomaly: Anomaly, detail: String| {
            if warned.insert((index, anomaly)) {
                let name = column.map(|c| c.name.as_str()).unwrap_or("?");
                warn!(column = name, "Left value unconverted: {detail}");
            }
        };

        match value {
            RawValue::Null => Value::Null,

            RawValue::Integer(i) if is_date && i == NULL_DATE_SENTINEL_INT => Value::Null,
            RawValue::Integer(i) if is_date && self.policy.dates == DateMode::Iso => {
                match date_from_digits(&i.to_string()) {
                    Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
                    None => {
                        report(Anomaly::BadDate, format!("{i} is not a valid YYYYMMDD date"));
                        Value::Int(i)
                    }
                }
            }
            RawValue::Integer(i) => Value::Int(i),

            RawValue::Real(f) if f.is_finite() => Value::Float(f),
            RawValue::Real(f) => {
                report(Anomaly::NonFinite, format!("{f} has no JSON representation"));
                Value::String(f.to_string())
            }

            RawValue::Blob(bytes) => {
                let text = match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => return Value::String(to_hex(e.as_bytes())),
                };
                self.coerce_text(&text, is_date, column, &mut report)
            }

            RawValue::Text(text) => self.coerce_text(&text, is_date, column, &mut report),
        }
    }

    fn coerce_text(
        &self,
        text: &str,
        is_date: bool,
        column: Option<&ColumnInfo>,
        report: &mut impl FnMut(Anomaly, String),
    ) -> Value {
        let text = text.trim_end();
        if text == NULL_DATE_SENTINEL {
            return Value::Null;
        }

        if is_date {
            if self.policy.dates == DateMode::Iso && is_eight_digits(text) {
                return match date_from_digits(text) {
                    Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
                    None => {
                        report(Anomaly::BadDate, format!("'{text}' is not a valid YYYYMMDD date"));
                        Value::String(text.to_string())
                    }
                };
            }
            return Value::String(text.to_string());
        }

        let numeric = column.is_some_and(ColumnInfo::is_numeric);
        if numeric && self.policy.numeric_strings == NumericMode::Infer && !text.is_empty() {
            let candidate = text.trim_start();
            if let Ok(i) = candidate.parse::<i64>() {
                return Value::Int(i);
            }
            match candidate.parse::<f64>() {
                Ok(f) if f.is_finite() => return Value::Float(f),
                _ => report(Anomaly::BadNumber, format!("'{text}' is not numeric")),
            }
        }

        Value::String(text.to_string())
    }
}

fn is_eight_digits(text: &str) -> bool {
    text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit())
}

fn date_from_digits(text: &str) -> Option<NaiveDate> {
    if !is_eight_digits(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y%m%d").ok()
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Reads a stored date, accepting `YYYYMMDD` text or integers and ISO text.
///
/// The sentinel and anything unparseable yield `None`.
pub fn parse_yyyymmdd(value: &Value) -> Option<NaiveDate> {
    let text = value.as_text()?;
    let text = text.trim();
    if text == NULL_DATE_SENTINEL {
        return None;
    }
    date_from_digits(text).or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())
}

/// Formats a date the way the legacy engine stores it.
pub fn format_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
