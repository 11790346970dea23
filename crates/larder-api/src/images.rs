use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::error;

use larder_storage::BlobStorage;
use larder_types::api::{Claims, UploadQuery, UploadResponse};
use larder_types::validation::{ValidationError, validate_image};

use crate::AppState;

/// POST /images?filename=...: raw image bytes in the body.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    validate_image(content_type, bytes.len()).map_err(|e| match e {
        ValidationError::ImageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::UNSUPPORTED_MEDIA_TYPE,
    })?;

    let key = state.storage.put(&query.filename, &bytes).await.map_err(|e| {
        error!("Failed to store image {}: {}", query.filename, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: format!("/images/{}", key),
            key,
        }),
    ))
}

/// GET /images/{key}
pub async fn download_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    // Reject anything that could escape the storage directory
    if !BlobStorage::is_valid_key(&key) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let bytes = state
        .storage
        .read(&key)
        .await
        .map_err(|e| {
            error!("Failed to read image {}: {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&key))], bytes))
}

/// DELETE /images/{key}: succeeds even if the image is already gone.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    if !BlobStorage::is_valid_key(&key) {
        return Err(StatusCode::BAD_REQUEST);
    }

    state.storage.delete(&key).await.map_err(|e| {
        error!("Failed to delete image {}: {}", key, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(StatusCode::NO_CONTENT)
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("1718000000000_soup.PNG"), "image/png");
        assert_eq!(content_type_for("1_a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("1_noext"), "application/octet-stream");
    }
}
