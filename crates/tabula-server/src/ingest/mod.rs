//! File ingestion
//!
//! Uploaded files are parsed and persisted in the background.
//!
//! # Architecture
//!
//! - **config**: Batch size and worker limits (`INGEST_*` environment variables)
//! - **parser**: CSV / XLSX / XLS decoding into ordered rows
//! - **pipeline**: Status transitions and batched row persistence for one file
//! - **queue**: Channel-backed job queue with a bounded worker pool

pub mod config;
pub mod parser;
pub mod pipeline;
pub mod queue;

pub use config::IngestConfig;
pub use parser::{parse, ParseError};
pub use pipeline::{IngestOutcome, IngestionPipeline};
pub use queue::{IngestionQueue, IngestionTicket, QueueError};
