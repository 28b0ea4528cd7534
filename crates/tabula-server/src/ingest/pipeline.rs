// File ingestion pipeline
//
// Drives one uploaded file from `pending` to a terminal state:
// - Load the stored bytes and parse them off the async runtime
// - Mark the file `processing` with its total row count
// - Persist rows in fixed-size batches, one transaction per batch
// - Mark the file `completed`, or `failed` with the cause
//
// Rows committed before a failing batch stay in place.

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};

use super::config::IngestConfig;
use super::parser::{self, ParseError};
use crate::db::files::{self, StatusUpdate};
use crate::db::rows::{self, NewRow};
use crate::db::DbError;
use crate::models::{FileStatus, RowData};
use crate::storage::Storage;

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Completed { total_rows: i64 },
    Failed { processed_rows: i64, error: String },
}

impl IngestOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, IngestOutcome::Completed { .. })
    }
}

#[derive(Error, Debug)]
enum IngestError {
    #[error("File {0} not found")]
    NotFound(i64),

    #[error("File {0} is already {1}")]
    NotPending(i64, FileStatus),

    #[error("Failed to load file contents: {0}")]
    Storage(#[from] tabula_common::TabulaError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Parser task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Database(#[from] DbError),
}

const FALLBACK_ERROR: &str = "ingestion failed";

/// File ingestion pipeline
#[derive(Clone)]
pub struct IngestionPipeline {
    db: SqlitePool,
    storage: Storage,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(db: SqlitePool, storage: Storage, config: IngestConfig) -> Self {
        Self { db, storage, config }
    }

    /// Run the pipeline for one file
    ///
    /// Never returns an error: every failure is recorded on the file and
    /// reported through [`IngestOutcome::Failed`].
    #[tracing::instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub async fn run(&self, file_id: i64) -> IngestOutcome {
        let record = match files::get(&self.db, file_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.reject(IngestError::NotFound(file_id), 0),
            Err(e) => return self.reject(e.into(), 0),
        };

        // A file is ingested at most once; retries are not supported
        if record.status != FileStatus::Pending {
            return self.reject(
                IngestError::NotPending(file_id, record.status),
                record.processed_rows,
            );
        }

        info!(
            filename = %record.original_filename,
            file_type = %record.file_type,
            "Starting ingestion"
        );

        let parsed = match self.load_rows(&record.file_path, record.file_type.as_str()).await {
            Ok(rows) => rows,
            Err(e) => return self.mark_failed(file_id, 0, e).await,
        };

        let total_rows = parsed.len() as i64;
        let start = StatusUpdate::new(FileStatus::Processing)
            .total_rows(total_rows)
            .processed_rows(0);
        if let Err(e) = files::update_status(&self.db, file_id, &start).await {
            return self.mark_failed(file_id, 0, e.into()).await;
        }

        info!(total_rows, "Parsed file, persisting rows");

        let processed_rows = match self.persist_batches(file_id, parsed).await {
            Ok(processed) => processed,
            Err((processed, e)) => return self.mark_failed(file_id, processed, e).await,
        };

        let done = StatusUpdate::new(FileStatus::Completed);
        if let Err(e) = files::update_status(&self.db, file_id, &done).await {
            return self.mark_failed(file_id, processed_rows, e.into()).await;
        }

        info!(total_rows, "Ingestion completed");

        IngestOutcome::Completed { total_rows }
    }

    async fn load_rows(&self, key: &str, declared_type: &str) -> Result<Vec<RowData>, IngestError> {
        let bytes = self.storage.download(key).await?;
        let declared_type = declared_type.to_string();

        let rows = tokio::task::spawn_blocking(move || parser::parse(&bytes, &declared_type)).await??;

        Ok(rows)
    }

    /// Persist rows batch by batch; on failure returns how many rows were committed
    async fn persist_batches(
        &self,
        file_id: i64,
        parsed: Vec<RowData>,
    ) -> Result<i64, (i64, IngestError)> {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = parsed.len().div_ceil(batch_size);
        let mut processed: i64 = 0;
        let mut pending = parsed.into_iter();

        for batch_number in 1..=total_batches {
            let batch: Vec<NewRow> = pending
                .by_ref()
                .take(batch_size)
                .enumerate()
                .map(|(i, data)| NewRow {
                    row_number: processed + i as i64 + 1,
                    data,
                })
                .collect();
            let next_processed = processed + batch.len() as i64;

            rows::insert_batch_with_progress(&self.db, file_id, &batch, next_processed)
                .await
                .map_err(|e| (processed, IngestError::from(e)))?;

            processed = next_processed;
            info!(
                batch = batch_number,
                total_batches,
                rows = batch.len(),
                processed_rows = processed,
                "Batch committed"
            );
        }

        Ok(processed)
    }

    async fn mark_failed(&self, file_id: i64, processed_rows: i64, cause: IngestError) -> IngestOutcome {
        let mut message = cause.to_string();
        if message.trim().is_empty() {
            message = FALLBACK_ERROR.to_string();
        }

        error!(processed_rows, error = %message, "Ingestion failed");

        let update = StatusUpdate::new(FileStatus::Failed).error_message(message.clone());
        if let Err(e) = files::update_status(&self.db, file_id, &update).await {
            error!(error = %e, "Could not record ingestion failure");
        }

        IngestOutcome::Failed {
            processed_rows,
            error: message,
        }
    }

    /// Report a failure without touching the file record
    fn reject(&self, cause: IngestError, processed_rows: i64) -> IngestOutcome {
        warn!(error = %cause, "Ingestion skipped");
        IngestOutcome::Failed {
            processed_rows,
            error: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::files::NewFileRecord;
    use crate::models::FileType;
    use crate::storage::config::StorageConfig;
    use tempfile::TempDir;

    struct Fixture {
        pool: SqlitePool,
        storage: Storage,
        _dir: TempDir,
    }

    impl Fixture {
        async fn new(pool: SqlitePool) -> Self {
            let dir = TempDir::new().unwrap();
            let storage = Storage::new(StorageConfig::at(dir.path())).await.unwrap();
            Self { pool, storage, _dir: dir }
        }

        fn pipeline(&self, batch_size: usize) -> IngestionPipeline {
            IngestionPipeline::new(
                self.pool.clone(),
                self.storage.clone(),
                IngestConfig::default().with_batch_size(batch_size),
            )
        }

        async fn upload(&self, name: &str, bytes: &[u8]) -> i64 {
            let key = self.storage.build_key(name);
            self.storage.upload(&key, bytes).await.unwrap();
            let record = files::create(
                &self.pool,
                &NewFileRecord {
                    filename: key.clone(),
                    original_filename: name.to_string(),
                    file_path: key,
                    file_size: bytes.len() as i64,
                    file_type: FileType::from_filename(name).unwrap(),
                },
            )
            .await
            .unwrap();
            record.id
        }
    }

    fn csv_with_rows(n: usize) -> Vec<u8> {
        let mut body = String::from("id,name\n");
        for i in 1..=n {
            body.push_str(&format!("{i},person-{i}\n"));
        }
        body.into_bytes()
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_csv_ingested_in_batches(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("people.csv", &csv_with_rows(250)).await;

        let outcome = fx.pipeline(100).run(file_id).await;
        assert_eq!(outcome, IngestOutcome::Completed { total_rows: 250 });

        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert_eq!(record.total_rows, 250);
        assert_eq!(record.processed_rows, 250);
        assert!(record.error_message.is_none());

        let (stored, total) = rows::list_for_file(&fx.pool, file_id, 0, 1000).await.unwrap();
        assert_eq!(total, 250);
        let numbers: Vec<i64> = stored.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, (1..=250).collect::<Vec<_>>());
        assert_eq!(stored[149].data.0["name"], serde_json::json!("person-150"));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_corrupt_workbook_marks_failed(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("broken.xlsx", b"this is not a zip archive").await;

        let outcome = fx.pipeline(100).run(file_id).await;
        assert!(!outcome.is_completed());

        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Failed);
        assert_eq!(record.processed_rows, 0);
        assert_eq!(record.total_rows, 0);
        assert!(!record.error_message.unwrap_or_default().is_empty());
        assert_eq!(rows::count_for_file(&fx.pool, file_id).await.unwrap(), 0);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_batch_failure_keeps_committed_rows(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_late_rows BEFORE INSERT ON file_rows
            WHEN NEW.row_number > 150
            BEGIN
                SELECT RAISE(ABORT, 'row store unavailable');
            END
            "#,
        )
        .execute(&fx.pool)
        .await?;

        let file_id = fx.upload("people.csv", &csv_with_rows(250)).await;

        let outcome = fx.pipeline(100).run(file_id).await;
        match outcome {
            IngestOutcome::Failed { processed_rows, error } => {
                assert_eq!(processed_rows, 100);
                assert!(error.contains("row store unavailable"), "unexpected error: {error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Failed);
        assert_eq!(record.total_rows, 250);
        assert_eq!(record.processed_rows, 100);
        assert_eq!(rows::count_for_file(&fx.pool, file_id).await.unwrap(), 100);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_header_only_file_completes_empty(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("empty.csv", b"id,name\n").await;

        let outcome = fx.pipeline(100).run(file_id).await;
        assert_eq!(outcome, IngestOutcome::Completed { total_rows: 0 });

        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert_eq!(record.total_rows, 0);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_missing_blob_marks_failed(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("people.csv", &csv_with_rows(3)).await;
        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        fx.storage.delete(&record.file_path).await.unwrap();

        let outcome = fx.pipeline(100).run(file_id).await;
        assert!(!outcome.is_completed());

        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Failed);
        assert!(record.error_message.unwrap().contains("Failed to load file contents"));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_completed_file_is_not_ingested_twice(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("people.csv", &csv_with_rows(5)).await;
        let pipeline = fx.pipeline(2);

        assert!(pipeline.run(file_id).await.is_completed());
        let second = pipeline.run(file_id).await;
        assert!(!second.is_completed());

        let record = files::get(&fx.pool, file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert_eq!(rows::count_for_file(&fx.pool, file_id).await.unwrap(), 5);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_unknown_file(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let outcome = fx.pipeline(100).run(404).await;
        assert_eq!(
            outcome,
            IngestOutcome::Failed {
                processed_rows: 0,
                error: "File 404 not found".to_string()
            }
        );
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_progress_never_runs_ahead_of_rows(pool: SqlitePool) -> sqlx::Result<()> {
        use crate::features::files::queries::progress::{self, GetFileProgressQuery};

        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("people.csv", &csv_with_rows(400)).await;

        let pipeline = fx.pipeline(1);
        let run = tokio::spawn(async move { pipeline.run(file_id).await });

        let mut last_processed = 0;
        let mut last_percentage = 0.0;
        loop {
            // Progress is read before the row count, so rows can only be ahead
            let snapshot = progress::handle(fx.pool.clone(), GetFileProgressQuery { file_id })
                .await
                .unwrap();
            let stored = rows::count_for_file(&fx.pool, file_id).await.unwrap();

            assert!(snapshot.processed_rows >= last_processed);
            assert!(snapshot.progress_percentage >= last_percentage);
            assert!(
                snapshot.processed_rows <= stored,
                "progress reported {} rows but only {} are stored",
                snapshot.processed_rows,
                stored
            );
            last_processed = snapshot.processed_rows;
            last_percentage = snapshot.progress_percentage;

            if snapshot.status.is_terminal() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(run.await.unwrap(), IngestOutcome::Completed { total_rows: 400 });
        assert_eq!(last_processed, 400);
        assert_eq!(last_percentage, 100.0);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_deletes_succeed_while_ingesting(pool: SqlitePool) -> sqlx::Result<()> {
        let fx = Fixture::new(pool).await;
        let file_id = fx.upload("people.csv", &csv_with_rows(2000)).await;

        let mut others = Vec::new();
        for n in 0..150 {
            let id = fx.upload(&format!("other-{n}.csv"), b"id\n1\n").await;
            rows::insert_batch_with_progress(
                &fx.pool,
                id,
                &[NewRow {
                    row_number: 1,
                    data: RowData::new(),
                }],
                1,
            )
            .await
            .unwrap();
            others.push(id);
        }

        let pipeline = fx.pipeline(1);
        let run = tokio::spawn(async move { pipeline.run(file_id).await });

        // Start deleting only once batches are being committed
        while files::get(&fx.pool, file_id).await.unwrap().unwrap().processed_rows == 0 {
            tokio::task::yield_now().await;
        }

        for id in others {
            let deleted = files::delete(&fx.pool, id).await;
            assert!(
                matches!(deleted, Ok(Some(1))),
                "delete of file {id} during ingestion returned {deleted:?}"
            );
        }

        assert_eq!(run.await.unwrap(), IngestOutcome::Completed { total_rows: 2000 });
        assert_eq!(rows::count_for_file(&fx.pool, file_id).await.unwrap(), 2000);
        assert_eq!(files::count(&fx.pool).await.unwrap(), 1);
        Ok(())
    }
}
