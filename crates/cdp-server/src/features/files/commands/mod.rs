pub mod admin;
pub mod ingest_event;
pub mod upload;

pub use ingest_event::IngestEventCommand;
pub use upload::{UploadFileCommand, UploadFileError, UploadFileResponse};
