//! Caller-side helpers built on [`QueryTransport`](crate::transport::QueryTransport).
//!
//! `pagination` pages through a descriptor with a probe row instead of a
//! COUNT query; `batch` replaces per-parent lookups with one `IN` query.

pub mod batch;
pub mod pagination;

pub use batch::{BatchAssembler, RelatedRows};
pub use pagination::{Page, PaginationProber, TotalEstimate};
