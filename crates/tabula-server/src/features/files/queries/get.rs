use crate::db::{self, DbError};
use crate::features::files::types::FileDetail;
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileQuery {
    pub file_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GetFileError {
    #[error("File not found")]
    NotFound(i64),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl Request<Result<FileDetail, GetFileError>> for GetFileQuery {}

#[tracing::instrument(skip(pool))]
pub async fn handle(pool: SqlitePool, query: GetFileQuery) -> Result<FileDetail, GetFileError> {
    db::files::get(&pool, query.file_id)
        .await?
        .map(FileDetail::from)
        .ok_or(GetFileError::NotFound(query.file_id))
}
