pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    IngestEventCommand, UploadFileCommand, UploadFileError, UploadFileResponse,
};

pub use queries::{GetFileQuery, ListFilesQuery};

pub use routes::files_routes;
