//! Tabula Server Library
//!
//! HTTP service that ingests tabular files (CSV, XLSX, XLS) into queryable rows.
//!
//! # Overview
//!
//! - **Upload**: bytes land in local blob storage and a `pending` file record
//! - **Ingestion**: a queued worker parses the file and persists rows in
//!   fixed-size batches, advancing `processed_rows` after every batch
//! - **Queries**: paginated file and row listings plus a progress snapshot
//!   that stays readable while ingestion runs
//!
//! # Architecture
//!
//! Feature slices under [`features`] follow a CQRS layout: commands mutate
//! state, queries read it, and both implement `mediator::Request`. The
//! ingestion side lives in [`ingest`]: a format-dispatching parser, the
//! batch pipeline and the job queue that runs it.
//!
//! ## Framework Stack
//!
//! - **Axum**: HTTP routing and multipart uploads
//! - **SQLx**: SQLite persistence with embedded migrations
//! - **Tower**: Middleware and service abstractions
//!
//! # Example
//!
//! ```no_run
//! use tabula_server::{api, config::Config, db, ingest::IngestionQueue, storage::Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.to_db_config()).await?;
//!     db::run_migrations(&pool).await?;
//!     let storage = Storage::new(config.storage.clone()).await?;
//!     let (queue, _dispatcher) =
//!         IngestionQueue::start(pool.clone(), storage.clone(), config.ingest.clone());
//!     api::serve(api::AppState { db: pool, storage, queue }, &config).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod cqrs;
pub mod db;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod storage;

pub use cqrs::{build_mediator, AppMediator};
