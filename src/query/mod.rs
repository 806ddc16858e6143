//! Query execution for rowbridge.
//!
//! Isolated per-statement execution, result coercion and the agent-side
//! pipeline that ties validation, compilation and execution together.

pub mod coerce;
pub mod executor;
pub mod service;

pub use coerce::{format_yyyymmdd, parse_yyyymmdd, CoercionPolicy, DateMode, NumericMode, ResultCoercer};
pub use executor::IsolatedExecutor;
pub use service::{HealthReport, HealthStatus, QueryService};
