//! Test helpers and fixtures for feature tests
//!
//! # Examples
//!
//! ```rust,ignore
//! use tabula_server::features::shared::test_helpers::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_something(pool: SqlitePool) -> sqlx::Result<()> {
//!     let (storage, _dir) = TestFile::storage().await;
//!     let file = TestFile::new("people.csv", b"name\nada\n")
//!         .with_status(FileStatus::Processing, 10, 4)
//!         .insert(&pool, &storage)
//!         .await;
//!
//!     // ... test logic ...
//!     Ok(())
//! }
//! ```

use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::db::files::{self, FileRecord, NewFileRecord, StatusUpdate};
use crate::models::{FileStatus, FileType};
use crate::storage::{config::StorageConfig, Storage};

/// Builder for an uploaded file with its blob and record
#[derive(Debug, Clone)]
pub struct TestFile {
    pub name: String,
    pub content: Vec<u8>,
    pub status: Option<(FileStatus, i64, i64)>,
    pub error_message: Option<String>,
}

impl TestFile {
    pub fn new(name: &str, content: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_vec(),
            status: None,
            error_message: None,
        }
    }

    /// Move the record to `status` with the given counts after insertion
    pub fn with_status(mut self, status: FileStatus, total_rows: i64, processed_rows: i64) -> Self {
        self.status = Some((status, total_rows, processed_rows));
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error_message = Some(message.to_string());
        self
    }

    /// Storage rooted in a fresh temporary directory; keep the guard alive
    pub async fn storage() -> (Storage, TempDir) {
        let dir = TempDir::new().expect("create temp dir");
        let storage = Storage::new(StorageConfig::at(dir.path()))
            .await
            .expect("open storage");
        (storage, dir)
    }

    /// Write the blob and create the record
    pub async fn insert(self, pool: &SqlitePool, storage: &Storage) -> FileRecord {
        let key = storage.build_key(&self.name);
        storage
            .upload(&key, &self.content)
            .await
            .expect("store test blob");

        let record = files::create(
            pool,
            &NewFileRecord {
                filename: key.clone(),
                original_filename: self.name.clone(),
                file_path: key,
                file_size: self.content.len() as i64,
                file_type: FileType::from_filename(&self.name).expect("test file needs a known extension"),
            },
        )
        .await
        .expect("insert test file");

        match self.status {
            Some((status, total, processed)) => {
                let mut update = StatusUpdate::new(status)
                    .total_rows(total)
                    .processed_rows(processed);
                if let Some(message) = self.error_message {
                    update = update.error_message(message);
                }
                files::update_status(pool, record.id, &update)
                    .await
                    .expect("update test file status")
            }
            None => record,
        }
    }
}
