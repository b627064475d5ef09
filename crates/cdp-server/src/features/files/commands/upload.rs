use cdp_ingest::control::ControlStatus;
use cdp_ingest::error::IngestError;
use cdp_ingest::IngestionController;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::Instrument;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileCommand {
    pub file_name: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileResponse {
    pub file_id: String,
    pub storage_path: String,
    pub status: ControlStatus,
    pub reference_date: String,
    pub checksum: String,
    pub size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFileError {
    #[error("File name is required and cannot be empty")]
    FileNameRequired,
    #[error("File name must not exceed 255 characters")]
    FileNameLength,
    #[error("File name must not contain path separators")]
    FileNamePath,
    #[error("Content is required and cannot be empty")]
    ContentRequired,
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl From<UploadFileError> for AppError {
    fn from(err: UploadFileError) -> Self {
        match err {
            UploadFileError::Ingest(e) => AppError::Ingest(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl UploadFileCommand {
    pub fn validate(&self) -> Result<(), UploadFileError> {
        let name = self.file_name.trim();
        if name.is_empty() {
            return Err(UploadFileError::FileNameRequired);
        }
        if name.len() > 255 {
            return Err(UploadFileError::FileNameLength);
        }
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(UploadFileError::FileNamePath);
        }
        if self.content.is_empty() {
            return Err(UploadFileError::ContentRequired);
        }
        Ok(())
    }
}

/// Store the file under the raw prefix, register it, and ingest it in the background.
#[tracing::instrument(skip(controller, command), fields(file_name = %command.file_name, size = command.content.len()))]
pub async fn handle(
    controller: Arc<IngestionController>,
    command: UploadFileCommand,
) -> Result<UploadFileResponse, UploadFileError> {
    command.validate()?;

    let checksum = format!("{:x}", Sha256::digest(&command.content));
    let size = command.content.len();
    let file_name = command.file_name.trim().to_string();

    let record = controller.store_upload(&file_name, command.content.clone()).await?;

    let storage_path = record.storage_path.clone();
    let background = controller.clone();
    let bytes = command.content;
    let name = file_name.clone();
    let path = storage_path.clone();
    tokio::spawn(
        async move {
            match background.ingest(&bytes, &name, &path).await {
                Ok(report) => tracing::info!(
                    status = %report.status,
                    rows = report.rows_processed,
                    "Background ingestion finished"
                ),
                Err(e) => tracing::error!(error = %e, "Background ingestion failed"),
            }
        }
        .in_current_span(),
    );

    Ok(UploadFileResponse {
        file_id: record.file_id,
        storage_path,
        status: record.status,
        reference_date: record.reference_date,
        checksum,
        size,
    })
}
