use crate::db::{self, DbError};
use crate::storage::Storage;
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileCommand {
    pub file_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub message: String,
    pub deleted_rows: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteFileError {
    #[error("File not found")]
    NotFound(i64),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl Request<Result<DeleteFileResponse, DeleteFileError>> for DeleteFileCommand {}

/// Remove the record and all of its rows, then the stored blob
///
/// The blob goes last, so a database failure leaves the file intact. Once the
/// record is gone the delete has succeeded; a blob that cannot be removed is
/// only logged.
#[tracing::instrument(skip(pool, storage))]
pub async fn handle(
    pool: SqlitePool,
    storage: Storage,
    command: DeleteFileCommand,
) -> Result<DeleteFileResponse, DeleteFileError> {
    let record = db::files::get(&pool, command.file_id)
        .await?
        .ok_or(DeleteFileError::NotFound(command.file_id))?;

    let deleted_rows = db::files::delete(&pool, record.id)
        .await?
        .ok_or(DeleteFileError::NotFound(command.file_id))?;

    if let Err(e) = storage.delete(&record.file_path).await {
        tracing::warn!(file_id = record.id, key = %record.file_path, error = %e, "Failed to remove blob of deleted file");
    }

    tracing::info!(file_id = record.id, deleted_rows, "File deleted");

    Ok(DeleteFileResponse {
        message: "File deleted successfully".to_string(),
        deleted_rows,
    })
}
