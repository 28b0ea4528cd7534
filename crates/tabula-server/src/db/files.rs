//! File Record Store
//!
//! Metadata and lifecycle status for uploaded files. Status transitions are
//! written only by the ingestion pipeline; everything else here is plain CRUD.
//!
//! # Key Operations
//!
//! - `create()` - Insert a record in `pending` state with zero counts
//! - `get()` / `list()` / `count()` - Reads
//! - `update_status()` - Partial update of status and progress columns
//! - `delete()` - Remove the record, cascading to its rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};

use super::{DbError, DbResult};
use crate::models::{FileStatus, FileType};

/// One uploaded file and its ingestion state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub upload_date: DateTime<Utc>,
    pub status: FileStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub error_message: Option<String>,
}

/// Fields supplied by the uploader; the rest are defaulted by the store
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
}

/// Partial update of a file's lifecycle columns
///
/// `None` leaves the column untouched. Moving to any status other than
/// `failed` clears `error_message`.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: FileStatus,
    pub total_rows: Option<i64>,
    pub processed_rows: Option<i64>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: FileStatus) -> Self {
        Self {
            status,
            total_rows: None,
            processed_rows: None,
            error_message: None,
        }
    }

    pub fn total_rows(mut self, total: i64) -> Self {
        self.total_rows = Some(total);
        self
    }

    pub fn processed_rows(mut self, processed: i64) -> Self {
        self.processed_rows = Some(processed);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

const FILE_COLUMNS: &str = "id, filename, original_filename, file_path, file_size, file_type, \
     upload_date, status, total_rows, processed_rows, error_message";

pub async fn create(pool: &SqlitePool, new: &NewFileRecord) -> DbResult<FileRecord> {
    let sql = format!(
        r#"
        INSERT INTO uploaded_files
            (filename, original_filename, file_path, file_size, file_type, upload_date, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {FILE_COLUMNS}
        "#
    );

    let record = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(&new.filename)
        .bind(&new.original_filename)
        .bind(&new.file_path)
        .bind(new.file_size)
        .bind(new.file_type)
        .bind(Utc::now())
        .bind(FileStatus::Pending)
        .fetch_one(pool)
        .await?;

    tracing::debug!(file_id = record.id, filename = %record.filename, "File record created");

    Ok(record)
}

pub async fn get(pool: &SqlitePool, id: i64) -> DbResult<Option<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM uploaded_files WHERE id = $1");
    let record = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// Files in upload order (oldest first)
pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> DbResult<Vec<FileRecord>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM uploaded_files ORDER BY id LIMIT $1 OFFSET $2");
    let records = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;
    Ok(records)
}

pub async fn count(pool: &SqlitePool) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_files")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Apply a [`StatusUpdate`] atomically and return the updated record
///
/// Accepts any executor so the update can join a row-batch transaction.
pub async fn update_status<'e, E>(executor: E, id: i64, update: &StatusUpdate) -> DbResult<FileRecord>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        UPDATE uploaded_files
        SET status = $1,
            total_rows = COALESCE($2, total_rows),
            processed_rows = COALESCE($3, processed_rows),
            error_message = CASE WHEN $1 = 'failed' THEN COALESCE($4, error_message) ELSE NULL END
        WHERE id = $5
        RETURNING {FILE_COLUMNS}
        "#
    );

    sqlx::query_as::<_, FileRecord>(&sql)
        .bind(update.status)
        .bind(update.total_rows)
        .bind(update.processed_rows)
        .bind(update.error_message.as_deref())
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DbError::not_found("File", id))
}

/// Delete a file record together with all of its rows
///
/// Returns the number of rows that were removed, or `None` when no such file
/// exists. The first statement is a write, so the transaction holds the write
/// lock from the start and waits out a concurrent ingestion commit instead of
/// failing on a read-to-write upgrade.
#[tracing::instrument(skip(pool))]
pub async fn delete(pool: &SqlitePool, id: i64) -> DbResult<Option<i64>> {
    let mut tx = pool.begin().await?;

    let deleted_rows = sqlx::query("DELETE FROM file_rows WHERE file_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;

    let result = sqlx::query("DELETE FROM uploaded_files WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    tx.commit().await?;

    tracing::info!(file_id = id, deleted_rows, "File record deleted");

    Ok(Some(deleted_rows))
}
