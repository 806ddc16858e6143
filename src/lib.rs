//! rowbridge - a read-only query bridge for legacy embedded SQL engines.
//!
//! The agent side validates declarative query descriptors against an
//! allowlist, compiles them to parameterized SQL and runs each statement on
//! its own connection under a timeout. The caller side talks to agents over
//! HTTP and adds probe-row pagination and IN-clause batching.

pub mod auth;
pub mod caller;
pub mod cli;
pub mod config;
pub mod db;
pub mod descriptor;
pub mod error;
pub mod guard;
pub mod logging;
pub mod query;
pub mod sql;
pub mod transport;
