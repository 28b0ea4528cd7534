pub mod commands;
pub mod queries;
pub mod routes;
pub mod types;

pub use commands::{
    DeleteFileCommand, DeleteFileError, DeleteFileResponse, UploadFileCommand, UploadFileError,
};

pub use queries::{
    FileRowsResponse, GetFileError, GetFileProgressError, GetFileProgressQuery, GetFileQuery,
    GetFileRowsError, GetFileRowsQuery, ListFilesError, ListFilesQuery, ListFilesResponse,
    ProgressResponse,
};

pub use routes::files_routes;
pub use types::{FileDetail, FileRow, FileSummary};
