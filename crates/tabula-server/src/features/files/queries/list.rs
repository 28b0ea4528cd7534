use crate::db::{self, DbError};
use crate::features::files::types::FileSummary;
use crate::features::shared::pagination::PageParams;
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilesQuery {
    #[serde(flatten)]
    pub pagination: PageParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileSummary>,
    pub total: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ListFilesError {
    #[error("{0}")]
    InvalidPagination(&'static str),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl Request<Result<ListFilesResponse, ListFilesError>> for ListFilesQuery {}

impl ListFilesQuery {
    pub fn validate(&self) -> Result<(), ListFilesError> {
        self.pagination
            .validate()
            .map_err(ListFilesError::InvalidPagination)
    }
}

#[tracing::instrument(skip(pool))]
pub async fn handle(pool: SqlitePool, query: ListFilesQuery) -> Result<ListFilesResponse, ListFilesError> {
    query.validate()?;

    let records = db::files::list(&pool, query.pagination.skip(), query.pagination.limit()).await?;
    let total = db::files::count(&pool).await?;

    Ok(ListFilesResponse {
        files: records.into_iter().map(FileSummary::from).collect(),
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shared::test_helpers::TestFile;

    fn query(skip: Option<i64>, limit: Option<i64>) -> ListFilesQuery {
        ListFilesQuery {
            pagination: PageParams::new(skip, limit),
        }
    }

    #[test]
    fn test_validation_invalid_limit() {
        assert!(matches!(
            query(None, Some(0)).validate(),
            Err(ListFilesError::InvalidPagination(_))
        ));
        assert!(matches!(
            query(None, Some(1001)).validate(),
            Err(ListFilesError::InvalidPagination(_))
        ));
    }

    #[test]
    fn test_validation_negative_skip() {
        assert!(matches!(
            query(Some(-5), None).validate(),
            Err(ListFilesError::InvalidPagination(_))
        ));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_list_pages_with_total(pool: SqlitePool) -> sqlx::Result<()> {
        let (storage, _dir) = TestFile::storage().await;
        for name in ["a.csv", "b.csv", "c.xlsx"] {
            TestFile::new(name, b"x\n1\n").insert(&pool, &storage).await;
        }

        let response = handle(pool.clone(), query(Some(1), Some(1))).await.unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].original_filename, "b.csv");

        let everything = handle(pool, ListFilesQuery::default()).await.unwrap();
        assert_eq!(everything.files.len(), 3);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_list_empty(pool: SqlitePool) -> sqlx::Result<()> {
        let response = handle(pool, ListFilesQuery::default()).await.unwrap();
        assert!(response.files.is_empty());
        assert_eq!(response.total, 0);
        Ok(())
    }
}
