use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::core::types::{
    MessageResponse, ProcessRegionRequest, ProcessRegionResponse, ScanRequest, ScanResponse,
    UploadResponse,
};
use crate::services::storage::ImagePool;

pub async fn root() -> &'static str {
    "Manga Reader Backend - region OCR and translation"
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": state.capabilities,
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let mut snapshot = serde_json::to_value(state.metrics.snapshot())
        .map_err(|e| ApiError::Internal(format!("Failed to serialize metrics: {}", e)))?;
    if let Ok(history_len) = state.pipeline.history_len().await {
        snapshot["history_entries"] = history_len.into();
    }
    Ok(Json(snapshot))
}

/// Upload one image or a zip of images (multipart field `file`).
///
/// Responds with every image now in the pool.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.ok_or_else(|| ApiError::BadRequest("No file part".into()))?;
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".into()));
    }

    let pool = state.pipeline.uploads();
    let added = pool.store_upload(&filename, &data).await?;
    state.metrics.record_images_ingested(added.len());
    info!("Upload {}: {} image(s) added", filename, added.len());

    let images = pool
        .list_images()
        .await?
        .iter()
        .map(|name| pool.url_for(name))
        .collect();
    Ok(Json(UploadResponse { images }))
}

/// Empty the image pool
pub async fn clear(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state.pipeline.uploads().clear().await?;
    state.metrics.record_pool_clear();
    Ok(Json(MessageResponse {
        message: "All files and empty directories cleared successfully".to_string(),
    }))
}

pub async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    serve_from(state.pipeline.uploads(), &filename).await
}

pub async fn serve_artifact(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    serve_from(state.pipeline.artifacts(), &filename).await
}

async fn serve_from(pool: &ImagePool, filename: &str) -> ApiResult<Response> {
    let content = pool.read(filename).await?;
    let mime = mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string();
    Ok(([(header::CONTENT_TYPE, mime)], content).into_response())
}

pub async fn process_region(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRegionRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessRegionResponse>> {
    let Json(request) = payload?;
    let response = state.pipeline.process_region(request).await?;
    Ok(Json(response))
}

pub async fn scan(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResult<Json<ScanResponse>> {
    let Json(request) = payload?;
    let boxes = state.pipeline.scan(&request).await?;
    Ok(Json(ScanResponse { boxes }))
}

/// Drop processed artifacts and restart the translation conversation
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state.pipeline.clear_cache().await?;
    Ok(Json(MessageResponse {
        message: "Translation cache cleared successfully".to_string(),
    }))
}
