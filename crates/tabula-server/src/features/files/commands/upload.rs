use crate::db::{self, files::NewFileRecord, DbError};
use crate::features::files::types::FileSummary;
use crate::ingest::{IngestionQueue, QueueError};
use crate::models::FileType;
use crate::storage::Storage;
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tabula_common::TabulaError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileCommand {
    pub filename: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFileError {
    #[error("Filename is required and cannot be empty")]
    FilenameRequired,
    #[error("Filename must not exceed 255 characters")]
    FilenameLength,
    #[error("File type not supported. Allowed types: {}", FileType::allowed_extensions())]
    UnsupportedType,
    #[error("Storage error: {0}")]
    Storage(#[from] TabulaError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Could not schedule ingestion: {0}")]
    Queue(#[from] QueueError),
}

impl Request<Result<FileSummary, UploadFileError>> for UploadFileCommand {}

impl UploadFileCommand {
    pub fn validate(&self) -> Result<FileType, UploadFileError> {
        if self.filename.trim().is_empty() {
            return Err(UploadFileError::FilenameRequired);
        }
        if self.filename.len() > 255 {
            return Err(UploadFileError::FilenameLength);
        }
        FileType::from_filename(&self.filename).ok_or(UploadFileError::UnsupportedType)
    }
}

/// Store the upload, record it as `pending` and queue it for ingestion
///
/// Nothing is written when validation fails. Once the blob exists, any later
/// failure removes it again, together with the record if one was created.
#[tracing::instrument(skip(pool, storage, queue, command), fields(filename = %command.filename))]
pub async fn handle(
    pool: SqlitePool,
    storage: Storage,
    queue: IngestionQueue,
    command: UploadFileCommand,
) -> Result<FileSummary, UploadFileError> {
    let file_type = command.validate()?;

    let key = storage.build_key(&command.filename);
    let upload = match storage.upload(&key, &command.content).await {
        Ok(upload) => upload,
        Err(e) => {
            discard_blob(&storage, &key).await;
            return Err(e.into());
        }
    };

    let new_record = NewFileRecord {
        filename: key.clone(),
        original_filename: command.filename.clone(),
        file_path: key.clone(),
        file_size: upload.size,
        file_type,
    };

    let record = match db::files::create(&pool, &new_record).await {
        Ok(record) => record,
        Err(e) => {
            discard_blob(&storage, &key).await;
            return Err(e.into());
        }
    };

    if let Err(e) = queue.submit(record.id) {
        tracing::error!(file_id = record.id, error = %e, "Failed to queue ingestion");
        if let Err(db_err) = db::files::delete(&pool, record.id).await {
            tracing::error!(file_id = record.id, error = %db_err, "Failed to remove unqueued file record");
        }
        discard_blob(&storage, &key).await;
        return Err(e.into());
    }

    tracing::info!(
        file_id = record.id,
        size = upload.size,
        checksum = %upload.checksum,
        "File uploaded and queued for ingestion"
    );

    Ok(record.into())
}

async fn discard_blob(storage: &Storage, key: &str) {
    if let Err(e) = storage.delete(key).await {
        tracing::warn!(key, error = %e, "Failed to remove blob after upload error");
    }
}
