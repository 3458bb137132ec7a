use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::auth::AdminContext;
use super::error::{ApiError, ErrorCode};
use super::extract::ApiJson;
use crate::storage::{ImageUpload, MAX_IMAGE_BYTES};
use crate::AppState;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// Request body limit for the upload route (image plus multipart framing)
pub const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub image_url: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(
            ErrorCode::PayloadTooLarge,
            format!("Image exceeds the {} byte limit", MAX_IMAGE_BYTES),
        )
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        upload = Some(ImageUpload::new(&filename, content_type.as_deref(), data)?);
        break;
    }

    let upload = upload.ok_or_else(|| {
        ApiError::validation_field(IMAGE_FIELD, "No image file provided (multipart field \"image\")")
    })?;

    let size = upload.len();
    let image_url = state.images.put(upload).await?;
    info!(admin_id = %admin.admin_id, size, url = %image_url, "Product image uploaded");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "image_url": image_url, "message": "Image uploaded successfully" })),
    ))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    ApiJson(req): ApiJson<DeleteImageRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.image_url.trim().is_empty() {
        return Err(ApiError::validation_field("image_url", "Image URL is required"));
    }

    state.images.delete(req.image_url.trim()).await?;
    info!(admin_id = %admin.admin_id, url = %req.image_url, "Product image deleted");

    Ok(Json(json!({ "message": "Image deleted successfully" })))
}
