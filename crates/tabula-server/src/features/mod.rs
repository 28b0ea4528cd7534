//! Feature modules implementing the Tabula API
//!
//! Each feature is a vertical slice with its own commands, queries and
//! routes:
//! - `commands/` - Write operations (upload, delete)
//! - `queries/` - Read operations (list, get, rows, progress)
//! - `routes.rs` - HTTP route definitions
//! - `types.rs` - Response shapes shared by the slice
//!
//! Commands and queries implement `mediator::Request`, so they can be
//! dispatched through [`crate::cqrs::build_mediator`] as well as called
//! directly from the routes.

pub mod files;
pub mod shared;

use axum::Router;

use crate::ingest::IngestionQueue;
use crate::storage::Storage;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// SQLite connection pool holding file records and rows
    pub db: sqlx::SqlitePool,
    /// Local blob store for uploaded bytes
    pub storage: Storage,
    /// Handle used by uploads to schedule ingestion
    pub queue: IngestionQueue,
}

/// Creates the router with all feature routes mounted
///
/// - `/files` - Upload, inspect, page and delete tabular files
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/files", files::files_routes().with_state(state))
}
