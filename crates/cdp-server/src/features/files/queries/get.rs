use cdp_ingest::control::ControlRecord;
use cdp_ingest::IngestionController;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct GetFileQuery {
    pub file_id: String,
}

#[tracing::instrument(skip(controller))]
pub async fn handle(
    controller: Arc<IngestionController>,
    query: GetFileQuery,
) -> Result<ControlRecord, AppError> {
    let file_id = query.file_id.trim();
    if file_id.is_empty() {
        return Err(AppError::BadRequest("file_id is required".to_string()));
    }
    controller
        .record(file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no control record for '{file_id}'")))
}
