//! Shared pagination utilities
//!
//! List endpoints page with `skip`/`limit` offsets. Responses that report
//! pages derive them from the offset.
//!
//! # Examples
//!
//! ```rust,ignore
//! use tabula_server::features::shared::pagination::{PageParams, PageMetadata};
//!
//! let params = PageParams::new(Some(200), Some(100));
//! params.validate()?;
//!
//! // After fetching data...
//! let meta = PageMetadata::new(params.skip(), params.limit(), 250);
//! assert_eq!(meta.page, 3);
//! ```

use serde::{Deserialize, Serialize};

/// Default number of items per page
pub const DEFAULT_LIMIT: i64 = 100;

/// Largest accepted `limit`
pub const MAX_LIMIT: i64 = 1000;

/// Offset pagination request parameters
///
/// Defaults to `skip=0`, `limit=100`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn new(skip: Option<i64>, limit: Option<i64>) -> Self {
        Self { skip, limit }
    }

    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Out-of-range values are rejected rather than clamped
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.skip() < 0 {
            return Err("Skip must be greater than or equal to 0");
        }
        if !(1..=MAX_LIMIT).contains(&self.limit()) {
            return Err("Limit must be between 1 and 1000");
        }
        Ok(())
    }
}

/// Page position of an offset query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMetadata {
    /// 1-indexed page containing the first returned item
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PageMetadata {
    pub fn new(skip: i64, limit: i64, total: i64) -> Self {
        let limit = limit.max(1);
        Self {
            page: skip / limit + 1,
            limit,
            total,
            total_pages: total_pages(total, limit),
        }
    }
}

/// `ceil(total / limit)`, zero when there is nothing to page
pub fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 || limit <= 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}
