use crate::db::{self, DbError};
use crate::features::files::types::FileRow;
use crate::features::shared::pagination::{PageMetadata, PageParams};
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileRowsQuery {
    pub file_id: i64,
    #[serde(flatten)]
    pub pagination: PageParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRowsResponse {
    pub rows: Vec<FileRow>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GetFileRowsError {
    #[error("{0}")]
    InvalidPagination(&'static str),
    #[error("File not found")]
    NotFound(i64),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl Request<Result<FileRowsResponse, GetFileRowsError>> for GetFileRowsQuery {}

impl GetFileRowsQuery {
    pub fn validate(&self) -> Result<(), GetFileRowsError> {
        self.pagination
            .validate()
            .map_err(GetFileRowsError::InvalidPagination)
    }
}

/// A page of a file's rows in `row_number` order
///
/// Safe to call while the file is still being ingested: only committed
/// batches are visible and `total` counts exactly those.
#[tracing::instrument(skip(pool))]
pub async fn handle(pool: SqlitePool, query: GetFileRowsQuery) -> Result<FileRowsResponse, GetFileRowsError> {
    query.validate()?;

    if db::files::get(&pool, query.file_id).await?.is_none() {
        return Err(GetFileRowsError::NotFound(query.file_id));
    }

    let skip = query.pagination.skip();
    let limit = query.pagination.limit();
    let (records, total) = db::rows::list_for_file(&pool, query.file_id, skip, limit).await?;
    let meta = PageMetadata::new(skip, limit, total);

    Ok(FileRowsResponse {
        rows: records.into_iter().map(FileRow::from).collect(),
        total: meta.total,
        page: meta.page,
        limit: meta.limit,
        total_pages: meta.total_pages,
    })
}
