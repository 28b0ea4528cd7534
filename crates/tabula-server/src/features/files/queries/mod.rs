pub mod get;
pub mod list;
pub mod progress;
pub mod rows;

pub use get::{GetFileError, GetFileQuery};
pub use list::{ListFilesError, ListFilesQuery, ListFilesResponse};
pub use progress::{GetFileProgressError, GetFileProgressQuery, ProgressResponse};
pub use rows::{FileRowsResponse, GetFileRowsError, GetFileRowsQuery};
