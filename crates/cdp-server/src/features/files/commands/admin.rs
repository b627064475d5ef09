//! Administrative commands. Authorization is checked by the controller
//! against the caller resolved from the request.

use cdp_ingest::controller::{
    Caller, DeleteOutcome, DeleteRequest, IngestReport, ReprocessRequest, ResetSummary,
};
use cdp_ingest::IngestionController;
use std::sync::Arc;

use crate::error::AppError;

#[tracing::instrument(skip(controller, request), fields(file_id = %request.file_id))]
pub async fn delete(
    controller: Arc<IngestionController>,
    caller: Caller,
    request: DeleteRequest,
) -> Result<DeleteOutcome, AppError> {
    Ok(controller.delete(caller, &request).await?)
}

#[tracing::instrument(skip(controller, request), fields(storage_path = %request.storage_path))]
pub async fn reprocess(
    controller: Arc<IngestionController>,
    caller: Caller,
    request: ReprocessRequest,
) -> Result<IngestReport, AppError> {
    Ok(controller.reprocess(caller, &request).await?)
}

#[tracing::instrument(skip(controller))]
pub async fn reset_all(
    controller: Arc<IngestionController>,
    caller: Caller,
) -> Result<ResetSummary, AppError> {
    tracing::warn!(privileged = caller.privileged, "Reset of all ingested data requested");
    Ok(controller.reset_all(caller).await?)
}
