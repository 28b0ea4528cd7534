use crate::db::{self, DbError};
use crate::models::FileStatus;
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileProgressQuery {
    pub file_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub file_id: i64,
    pub status: FileStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub progress_percentage: f64,
    pub error_message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetFileProgressError {
    #[error("File not found")]
    NotFound(i64),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl Request<Result<ProgressResponse, GetFileProgressError>> for GetFileProgressQuery {}

/// `100 * processed / total` rounded to two decimals; 0 when nothing is known yet
pub fn progress_percentage(processed_rows: i64, total_rows: i64) -> f64 {
    if total_rows <= 0 {
        return 0.0;
    }
    let ratio = processed_rows as f64 / total_rows as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

#[tracing::instrument(skip(pool))]
pub async fn handle(pool: SqlitePool, query: GetFileProgressQuery) -> Result<ProgressResponse, GetFileProgressError> {
    let record = db::files::get(&pool, query.file_id)
        .await?
        .ok_or(GetFileProgressError::NotFound(query.file_id))?;

    Ok(ProgressResponse {
        file_id: record.id,
        status: record.status,
        total_rows: record.total_rows,
        processed_rows: record.processed_rows,
        progress_percentage: progress_percentage(record.processed_rows, record.total_rows),
        error_message: record.error_message,
    })
}
