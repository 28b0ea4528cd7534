//! Row Store
//!
//! Parsed rows of a file, keyed by `(file_id, row_number)`. Row numbers are
//! 1-based positions in the source file after the header.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::files::{self, StatusUpdate};
use super::DbResult;
use crate::models::{FileStatus, RowData};

/// SQLite caps bound parameters per statement; three binds per row keeps a
/// chunk of this size well below the oldest limit (999).
const INSERT_CHUNK_ROWS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RowRecord {
    pub id: i64,
    pub file_id: i64,
    pub row_number: i64,
    pub data: Json<RowData>,
}

#[derive(Debug, Clone)]
pub struct NewRow {
    pub row_number: i64,
    pub data: RowData,
}

/// Insert rows on an existing connection or transaction
pub async fn insert_batch(conn: &mut SqliteConnection, file_id: i64, rows: &[NewRow]) -> DbResult<u64> {
    let mut inserted = 0;

    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO file_rows (file_id, row_number, data) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(file_id)
                .push_bind(row.row_number)
                .push_bind(Json(&row.data));
        });

        let result = builder.build().execute(&mut *conn).await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Persist one batch and the file's new `processed_rows` in a single transaction
///
/// Either both the rows and the progress value become visible, or neither does.
#[tracing::instrument(skip(pool, rows), fields(batch_len = rows.len()))]
pub async fn insert_batch_with_progress(
    pool: &SqlitePool,
    file_id: i64,
    rows: &[NewRow],
    processed_rows: i64,
) -> DbResult<()> {
    let mut tx = pool.begin().await?;

    insert_batch(&mut *tx, file_id, rows).await?;
    files::update_status(
        &mut *tx,
        file_id,
        &StatusUpdate::new(FileStatus::Processing).processed_rows(processed_rows),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// A page of rows ordered by `row_number`, together with the file's total row count
///
/// Both reads run in one transaction so the page and the total agree.
pub async fn list_for_file(
    pool: &SqlitePool,
    file_id: i64,
    skip: i64,
    limit: i64,
) -> DbResult<(Vec<RowRecord>, i64)> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query_as::<_, RowRecord>(
        r#"
        SELECT id, file_id, row_number, data
        FROM file_rows
        WHERE file_id = $1
        ORDER BY row_number
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(file_id)
    .bind(limit)
    .bind(skip)
    .fetch_all(&mut *tx)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_rows WHERE file_id = $1")
        .bind(file_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((rows, total))
}

pub async fn count_for_file(pool: &SqlitePool, file_id: i64) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_rows WHERE file_id = $1")
        .bind(file_id)
        .fetch_one(pool)
        .await?;
    Ok(total)
}
