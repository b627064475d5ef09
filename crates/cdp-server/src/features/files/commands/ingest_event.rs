use cdp_ingest::controller::ObjectOutcome;
use cdp_ingest::IngestionController;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppError;

/// Object-storage notification: an object was written at `storage_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEventCommand {
    pub storage_path: String,
}

impl IngestEventCommand {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.storage_path.trim().is_empty() {
            return Err(AppError::BadRequest("storage_path is required".to_string()));
        }
        Ok(())
    }
}

#[tracing::instrument(skip(controller), fields(storage_path = %command.storage_path))]
pub async fn handle(
    controller: Arc<IngestionController>,
    command: IngestEventCommand,
) -> Result<ObjectOutcome, AppError> {
    command.validate()?;
    Ok(controller.handle_object(command.storage_path.trim()).await?)
}
