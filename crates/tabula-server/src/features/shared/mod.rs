//! Shared utilities and types for feature modules
//!
//! # Contents
//!
//! - **pagination**: `skip`/`limit` parameters and page metadata
//! - **test_helpers**: Fixtures for feature tests (test-only)

pub mod pagination;

#[cfg(test)]
pub mod test_helpers;

pub use pagination::{PageMetadata, PageParams};
