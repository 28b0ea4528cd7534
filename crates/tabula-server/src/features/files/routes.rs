//! File API routes
//!
//! # Route Structure
//!
//! - `POST /files` - Upload a csv/xlsx/xls file and queue it for ingestion
//! - `GET /files` - List uploaded files (`skip`, `limit`)
//! - `GET /files/:id` - Get one file, including any ingestion error
//! - `GET /files/:id/rows` - Page through a file's parsed rows (`skip`, `limit`)
//! - `GET /files/:id/progress` - Ingestion progress snapshot
//! - `DELETE /files/:id` - Delete a file, its blob and its rows

use crate::api::response::ErrorResponse;
use crate::features::shared::pagination::PageParams;
use crate::features::FeatureState;
use axum::{
    async_trait,
    extract::{
        multipart::MultipartError, rejection::PathRejection, FromRequestParts, Multipart, Path,
        Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::{
    commands::{DeleteFileCommand, DeleteFileError, UploadFileCommand, UploadFileError},
    queries::{
        GetFileError, GetFileProgressError, GetFileProgressQuery, GetFileQuery, GetFileRowsError,
        GetFileRowsQuery, ListFilesError, ListFilesQuery,
    },
};

pub fn files_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", post(upload_file).get(list_files))
        .route("/:id", get(get_file).delete(delete_file))
        .route("/:id/rows", get(get_file_rows))
        .route("/:id/progress", get(get_file_progress))
}

/// Numeric `:id` path segment; anything else is rejected as a validation error
struct FileId(i64);

#[async_trait]
impl<S> FromRequestParts<S> for FileId
where
    S: Send + Sync,
{
    type Rejection = FileApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(file_id) = Path::<i64>::from_request_parts(parts, state).await?;
        Ok(Self(file_id))
    }
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Upload a file
///
/// Expects a multipart body with a `file` field carrying the filename.
///
/// # Response
///
/// - `201 Created` - File stored with status `pending`, ingestion queued
/// - `400 Bad Request` - Missing file field or unsupported extension
/// - `503 Service Unavailable` - Ingestion queue full or shut down
/// - `500 Internal Server Error` - Storage or database error
#[tracing::instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<FeatureState>,
    mut multipart: Multipart,
) -> Result<Response, FileApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FileApiError::multipart("Failed to read multipart field", e))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| FileApiError::multipart("Failed to read file bytes", e))?;
        upload = Some((filename, data.to_vec()));
    }

    let (filename, content) = upload.ok_or(FileApiError::MissingFile)?;

    let command = UploadFileCommand { filename, content };
    let response =
        super::commands::upload::handle(state.db, state.storage, state.queue, command).await?;

    tracing::info!(
        file_id = response.id,
        file_type = %response.file_type,
        size = response.file_size,
        "File uploaded via API"
    );

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Delete a file with its blob and rows
///
/// # Response
///
/// - `200 OK` - `{"message": "File deleted successfully", "deleted_rows": n}`
/// - `404 Not Found` - Unknown file id
#[tracing::instrument(skip(state))]
async fn delete_file(
    State(state): State<FeatureState>,
    FileId(file_id): FileId,
) -> Result<Response, FileApiError> {
    let response =
        super::commands::delete::handle(state.db, state.storage, DeleteFileCommand { file_id })
            .await?;

    tracing::info!(file_id, deleted_rows = response.deleted_rows, "File deleted via API");

    Ok((StatusCode::OK, Json(response)).into_response())
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

#[tracing::instrument(skip(state))]
async fn list_files(
    State(state): State<FeatureState>,
    Query(pagination): Query<PageParams>,
) -> Result<Response, FileApiError> {
    let response =
        super::queries::list::handle(state.db, ListFilesQuery { pagination }).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_file(
    State(state): State<FeatureState>,
    FileId(file_id): FileId,
) -> Result<Response, FileApiError> {
    let response = super::queries::get::handle(state.db, GetFileQuery { file_id }).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Page through a file's rows
///
/// Rows of a file that is still `processing` are visible batch by batch.
#[tracing::instrument(skip(state))]
async fn get_file_rows(
    State(state): State<FeatureState>,
    FileId(file_id): FileId,
    Query(pagination): Query<PageParams>,
) -> Result<Response, FileApiError> {
    let query = GetFileRowsQuery {
        file_id,
        pagination,
    };
    let response = super::queries::rows::handle(state.db, query).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_file_progress(
    State(state): State<FeatureState>,
    FileId(file_id): FileId,
) -> Result<Response, FileApiError> {
    let response =
        super::queries::progress::handle(state.db, GetFileProgressQuery { file_id }).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum FileApiError {
    #[error("{1}")]
    Multipart(StatusCode, String),
    #[error("No file field found in multipart data")]
    MissingFile,
    #[error("Invalid file id: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Upload(#[from] UploadFileError),
    #[error(transparent)]
    Delete(#[from] DeleteFileError),
    #[error(transparent)]
    List(#[from] ListFilesError),
    #[error(transparent)]
    Get(#[from] GetFileError),
    #[error(transparent)]
    Rows(#[from] GetFileRowsError),
    #[error(transparent)]
    Progress(#[from] GetFileProgressError),
}

impl From<PathRejection> for FileApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidPath(rejection.body_text())
    }
}

impl FileApiError {
    fn multipart(context: &str, err: MultipartError) -> Self {
        Self::Multipart(err.status(), format!("{}: {}", context, err.body_text()))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Multipart(status, _) if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE")
            },
            Self::Multipart(..)
            | Self::MissingFile
            | Self::InvalidPath(_)
            | Self::Upload(UploadFileError::FilenameRequired)
            | Self::Upload(UploadFileError::FilenameLength)
            | Self::Upload(UploadFileError::UnsupportedType)
            | Self::List(ListFilesError::InvalidPagination(_))
            | Self::Rows(GetFileRowsError::InvalidPagination(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            },
            Self::Delete(DeleteFileError::NotFound(_))
            | Self::Get(GetFileError::NotFound(_))
            | Self::Rows(GetFileRowsError::NotFound(_))
            | Self::Progress(GetFileProgressError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Upload(UploadFileError::Queue(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            },
            Self::Upload(UploadFileError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            },
            Self::Upload(UploadFileError::Database(_))
            | Self::Delete(DeleteFileError::Database(_))
            | Self::List(ListFilesError::Database(_))
            | Self::Get(GetFileError::Database(_))
            | Self::Rows(GetFileRowsError::Database(_))
            | Self::Progress(GetFileProgressError::Database(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            },
        }
    }
}

impl IntoResponse for FileApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match code {
            "STORAGE_ERROR" => {
                tracing::error!("Storage error in file API: {}", self);
                "A storage error occurred".to_string()
            },
            "INTERNAL_ERROR" => {
                tracing::error!("Database error in file API: {}", self);
                "An internal error occurred".to_string()
            },
            "SERVICE_UNAVAILABLE" => {
                tracing::warn!("Upload rejected: {}", self);
                self.to_string()
            },
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
