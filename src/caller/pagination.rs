//! Probe-row pagination.
//!
//! Each page asks for one row more than the page size. Getting that extra
//! row back means another page exists; it is dropped before returning. No
//! COUNT query is ever issued, so the total is only ever a lower bound until
//! the last page is reached.

use std::fmt;

use tracing::{debug, warn};

use crate::db::{ResultSet, Row};
use crate::descriptor::QueryDescriptor;
use crate::error::{BridgeError, Result};
use crate::transport::QueryTransport;

/// Default ceiling for [`PaginationProber::fetch_all`].
pub const DEFAULT_MAX_PAGES: u64 = 1_000;

/// What is known about the total row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalEstimate {
    /// More rows exist past this count.
    AtLeast(u64),
    /// The last page was reached; this is the real total.
    Exact(u64),
}

impl TotalEstimate {
    pub fn value(&self) -> u64 {
        match self {
            Self::AtLeast(n) | Self::Exact(n) => *n,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

impl fmt::Display for TotalEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast(n) => write!(f, "{n}+"),
            Self::Exact(n) => write!(f, "{n}"),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub page: u64,
    pub page_size: u32,
    pub offset: u64,
    pub has_next: bool,
    pub estimated_total: TotalEstimate,
}

/// Pages through a descriptor over any transport.
pub struct PaginationProber<'a> {
    transport: &'a dyn QueryTransport,
    page_size: u32,
    max_pages: u64,
}

impl<'a> PaginationProber<'a> {
    /// Creates a prober. A page size of 0 is treated as 1.
    ///
    /// Each page asks for `page_size + 1` rows, so `page_size` must be
    /// below the agent's `max_page_size`.
    pub fn new(transport: &'a dyn QueryTransport, page_size: u32) -> Self {
        Self {
            transport,
            page_size: page_size.max(1),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Sets the page ceiling for [`fetch_all`](Self::fetch_all).
    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches page `page` (zero-based) with one query.
    pub async fn fetch_page(&self, descriptor: &QueryDescriptor, page: u64) -> Result<Page> {
        if descriptor.order_by.is_empty() {
            warn!(
                table = %descriptor.table,
                "Paginating without order_by; page contents are not guaranteed to be stable"
            );
        }

        let page_size = u64::from(self.page_size);
        let offset = page
            .checked_mul(page_size)
            .ok_or_else(|| BridgeError::bad_request(format!("Page {page} is out of range")))?;
        let offset_i64 = i64::try_from(offset)
            .map_err(|_| BridgeError::bad_request(format!("Page {page} is out of range")))?;

        let probe = descriptor
            .clone()
            .limit(i64::from(self.page_size) + 1)
            .offset(offset_i64);
        let result = self.transport.query(&probe).await?;

        let ResultSet {
            columns, mut rows, ..
        } = result;
        let has_next = rows.len() > self.page_size as usize;
        rows.truncate(self.page_size as usize);

        let returned = rows.len() as u64;
        let estimated_total = if has_next {
            TotalEstimate::AtLeast(offset + returned + 1)
        } else {
            TotalEstimate::Exact(offset + returned)
        };
        debug!(page, returned, has_next, "Fetched page");

        Ok(Page {
            columns,
            rows,
            page,
            page_size: self.page_size,
            offset,
            has_next,
            estimated_total,
        })
    }

    /// Walks pages until the last one, concatenating rows.
    ///
    /// Stops with a warning once the page ceiling is reached.
    pub async fn fetch_all(&self, descriptor: &QueryDescriptor) -> Result<ResultSet> {
        let mut columns = Vec::new();
        let mut rows = Vec::new();

        for page in 0..self.max_pages {
            let fetched = self.fetch_page(descriptor, page).await?;
            if columns.is_empty() {
                columns = fetched.columns;
            }
            rows.extend(fetched.rows);
            if !fetched.has_next {
                return Ok(ResultSet::new(columns, rows));
            }
        }

        warn!(
            max_pages = self.max_pages,
            rows = rows.len(),
            "Stopped paging at the page ceiling; result is incomplete"
        );
        Ok(ResultSet::new(columns, rows))
    }
}
