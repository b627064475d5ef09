use crate::api::response::ApiResponse;
use crate::error::{ApiResult, AppError};
use crate::features::FeatureState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use cdp_ingest::controller::{DeleteRequest, ReprocessRequest};
use serde_json::json;

use super::{
    commands::{self, IngestEventCommand, UploadFileCommand},
    queries::{self, GetFileQuery, ListFilesQuery},
};

pub fn files_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(list_files))
        .route("/events", post(ingest_event))
        .route("/upload/:file_name", post(upload_file))
        .route("/admin/delete", post(delete_file))
        .route("/admin/reprocess", post(reprocess_file))
        .route("/admin/reset-all", post(reset_all))
        .route("/:file_id", get(get_file))
}

#[tracing::instrument(skip(state, multipart), fields(file_name = %file_name))]
async fn upload_file(
    State(state): State<FeatureState>,
    Path(file_name): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut content: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
            content = Some(data.to_vec());
        }
    }

    let content = content
        .ok_or_else(|| AppError::BadRequest("No file field found in multipart data".to_string()))?;

    let command = UploadFileCommand { file_name, content };
    let response = commands::upload::handle(state.controller.clone(), command).await?;

    tracing::info!(
        file_id = %response.file_id,
        size = response.size,
        checksum = %response.checksum,
        "File uploaded via API"
    );

    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

async fn ingest_event(
    State(state): State<FeatureState>,
    Json(command): Json<IngestEventCommand>,
) -> ApiResult<Response> {
    let outcome = commands::ingest_event::handle(state.controller.clone(), command).await?;
    Ok(ApiResponse::success(outcome).with_status(StatusCode::OK))
}

async fn list_files(
    State(state): State<FeatureState>,
    Query(query): Query<ListFilesQuery>,
) -> ApiResult<Response> {
    let (records, limit) = queries::list::handle(state.controller.clone(), query).await?;
    let meta = json!({ "count": records.len(), "limit": limit });
    Ok(ApiResponse::success_with_meta(records, meta).with_status(StatusCode::OK))
}

async fn get_file(
    State(state): State<FeatureState>,
    Path(file_id): Path<String>,
) -> ApiResult<Response> {
    let record = queries::get::handle(state.controller.clone(), GetFileQuery { file_id }).await?;
    Ok(ApiResponse::success(record).with_status(StatusCode::OK))
}

async fn delete_file(
    State(state): State<FeatureState>,
    headers: HeaderMap,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Response> {
    let caller = state.admin.caller(&headers);
    let outcome = commands::admin::delete(state.controller.clone(), caller, request).await?;
    Ok(ApiResponse::success(outcome).with_status(StatusCode::OK))
}

async fn reprocess_file(
    State(state): State<FeatureState>,
    headers: HeaderMap,
    Json(request): Json<ReprocessRequest>,
) -> ApiResult<Response> {
    let caller = state.admin.caller(&headers);
    let report = commands::admin::reprocess(state.controller.clone(), caller, request).await?;
    Ok(ApiResponse::success(report).with_status(StatusCode::OK))
}

async fn reset_all(State(state): State<FeatureState>, headers: HeaderMap) -> ApiResult<Response> {
    let caller = state.admin.caller(&headers);
    let summary = commands::admin::reset_all(state.controller.clone(), caller).await?;
    Ok(ApiResponse::success(summary).with_status(StatusCode::OK))
}
