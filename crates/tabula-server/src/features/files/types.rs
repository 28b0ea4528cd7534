//! Response shapes shared by the file commands and queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::files::FileRecord;
use crate::db::rows::RowRecord;
use crate::models::{FileStatus, FileType, RowData};

/// File as returned by upload and list; omits the storage path and error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub upload_date: DateTime<Utc>,
    pub status: FileStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
}

impl From<FileRecord> for FileSummary {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            original_filename: record.original_filename,
            file_size: record.file_size,
            file_type: record.file_type,
            upload_date: record.upload_date,
            status: record.status,
            total_rows: record.total_rows,
            processed_rows: record.processed_rows,
        }
    }
}

/// Full view of a single file, including any ingestion error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetail {
    #[serde(flatten)]
    pub summary: FileSummary,
    pub error_message: Option<String>,
}

impl From<FileRecord> for FileDetail {
    fn from(mut record: FileRecord) -> Self {
        let error_message = record.error_message.take();
        Self {
            summary: record.into(),
            error_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub row_number: i64,
    pub data: RowData,
}

impl From<RowRecord> for FileRow {
    fn from(record: RowRecord) -> Self {
        Self {
            id: record.id,
            row_number: record.row_number,
            data: record.data.0,
        }
    }
}
