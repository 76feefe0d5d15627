use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::storage::StoredBlob;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::avatar::AvatarImage;
use crate::error::{AppError, ErrorBody};
use crate::extractors::avatar_id::AvatarId;
use crate::extractors::json::AppJson;
use crate::imaging::Mask;
use crate::models::avatar::{AvatarResponse, MaskRequest, ResizeQuery};
use crate::state::AppState;

/// Room for multipart boundaries and the `config` part on top of the image.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn upload_body_limit(max_blob_size: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(usize::try_from(max_blob_size + MULTIPART_OVERHEAD).unwrap_or(usize::MAX))
}

#[utoipa::path(
    post,
    path = "/file/{id}",
    tag = "Avatars",
    operation_id = "createAvatar",
    summary = "Upload a new avatar",
    description = "Stores the image in the `files` multipart field. An optional `config` field \
        holds JSON `{\"mask\": [x0, y0, x1, y1]}`; without it the thumbnail is the original \
        itself, with it the thumbnail is that region of the original.",
    params(("id" = String, Path, description = "Avatar id (32 hex characters)")),
    request_body(content_type = "multipart/form-data", description = "Image with optional crop config"),
    responses(
        (status = 201, description = "Avatar created", body = AvatarResponse),
        (status = 400, description = "Invalid id, mask or form (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "An avatar already exists for this id (CONFLICT)", body = ErrorBody),
        (status = 413, description = "Image too large (PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 415, description = "Not a JPEG, PNG, GIF or BMP image (UNSUPPORTED_MEDIA_TYPE)", body = ErrorBody),
        (status = 422, description = "Corrupt image data (INVALID_IMAGE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart), fields(avatar_id = %id.as_str()))]
pub async fn create_avatar(
    id: AvatarId,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_upload(multipart, state.config.storage.max_blob_size).await?;
    let record = state
        .avatars
        .create(id.as_str(), &upload.filename, upload.bytes, upload.mask)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AvatarResponse::from_record(&record, &state.config.avatar.url_prefix)),
    ))
}

#[utoipa::path(
    put,
    path = "/file/{id}/raw",
    tag = "Avatars",
    operation_id = "replaceAvatar",
    summary = "Replace the image of an avatar",
    description = "Same form as the upload. The previous original and thumbnail are removed once \
        the new ones are in place.",
    params(("id" = String, Path, description = "Avatar id (32 hex characters)")),
    request_body(content_type = "multipart/form-data", description = "Image with optional crop config"),
    responses(
        (status = 200, description = "Avatar replaced", body = AvatarResponse),
        (status = 400, description = "Invalid id, mask or form (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Avatar not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Concurrent modification (CONFLICT)", body = ErrorBody),
        (status = 413, description = "Image too large (PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 415, description = "Unsupported image format (UNSUPPORTED_MEDIA_TYPE)", body = ErrorBody),
        (status = 422, description = "Corrupt image data (INVALID_IMAGE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart), fields(avatar_id = %id.as_str()))]
pub async fn replace_avatar(
    id: AvatarId,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    let upload = read_upload(multipart, state.config.storage.max_blob_size).await?;
    let record = state
        .avatars
        .replace(id.as_str(), &upload.filename, upload.bytes, upload.mask)
        .await?;
    Ok(Json(AvatarResponse::from_record(
        &record,
        &state.config.avatar.url_prefix,
    )))
}

#[utoipa::path(
    put,
    path = "/file/{id}",
    tag = "Avatars",
    operation_id = "changeAvatarMask",
    summary = "Re-crop the thumbnail",
    description = "Cuts a new thumbnail out of the stored original. The original is not touched.",
    params(("id" = String, Path, description = "Avatar id (32 hex characters)")),
    request_body = MaskRequest,
    responses(
        (status = 200, description = "Thumbnail updated", body = AvatarResponse),
        (status = 400, description = "Invalid id or mask (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Avatar not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Concurrent modification (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(avatar_id = %id.as_str()))]
pub async fn change_mask(
    id: AvatarId,
    State(state): State<AppState>,
    AppJson(payload): AppJson<MaskRequest>,
) -> Result<Json<AvatarResponse>, AppError> {
    let mask = payload.require_mask()?;
    let record = state.avatars.change_mask(id.as_str(), mask).await?;
    Ok(Json(AvatarResponse::from_record(
        &record,
        &state.config.avatar.url_prefix,
    )))
}

#[utoipa::path(
    get,
    path = "/file/{id}",
    tag = "Avatars",
    operation_id = "getAvatarThumbnail",
    summary = "Download the thumbnail",
    description = "Without query parameters the stored thumbnail is streamed with an ETag and \
        honours If-None-Match. With `w` and `h`, or `s`, a resized copy is returned instead.",
    params(("id" = String, Path, description = "Avatar id (32 hex characters)"), ResizeQuery),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 400, description = "Invalid id or resize parameters (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Avatar not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query, headers), fields(avatar_id = %id.as_str()))]
pub async fn get_thumbnail(
    id: AvatarId,
    State(state): State<AppState>,
    query: Result<Query<ResizeQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve_image(&state, &id, AvatarImage::Thumbnail, query, &headers).await
}

#[utoipa::path(
    get,
    path = "/file/{id}/raw",
    tag = "Avatars",
    operation_id = "getAvatarOriginal",
    summary = "Download the original",
    description = "Same as the thumbnail download, for the uncropped original.",
    params(("id" = String, Path, description = "Avatar id (32 hex characters)"), ResizeQuery),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 400, description = "Invalid id or resize parameters (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Avatar not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query, headers), fields(avatar_id = %id.as_str()))]
pub async fn get_original(
    id: AvatarId,
    State(state): State<AppState>,
    query: Result<Query<ResizeQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve_image(&state, &id, AvatarImage::Original, query, &headers).await
}

#[utoipa::path(
    delete,
    path = "/file/{id}",
    tag = "Avatars",
    operation_id = "deleteAvatar",
    summary = "Delete an avatar",
    description = "Removes the original, the thumbnail and the record.",
    params(("id" = String, Path, description = "Avatar id (32 hex characters)")),
    responses(
        (status = 204, description = "Avatar deleted"),
        (status = 400, description = "Invalid id (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Avatar not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(avatar_id = %id.as_str()))]
pub async fn delete_avatar(
    id: AvatarId,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.avatars.delete(id.as_str()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn serve_image(
    state: &AppState,
    id: &AvatarId,
    which: AvatarImage,
    query: Result<Query<ResizeQuery>, QueryRejection>,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    if let Some(spec) = query.to_spec()? {
        let (bytes, kind) = state.avatars.read_resized(id.as_str(), which, spec).await?;
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, kind.mime_type())
            .header(header::CONTENT_LENGTH, bytes.len().to_string())
            .body(Body::from(bytes))
            .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")));
    }

    let StoredBlob { info, reader } = state.avatars.read(id.as_str(), which).await?;
    let etag_value = info.content_hash.etag();
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && etag_matches(val, &etag_value)
    {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag_value)]).into_response());
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &info.content_type)
        .header(header::CONTENT_LENGTH, info.size.to_string())
        .header(header::ETAG, &etag_value)
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// The parts of an upload form the lifecycle cares about.
struct Upload {
    filename: String,
    bytes: Vec<u8>,
    mask: Option<Mask>,
}

async fn read_upload(mut multipart: Multipart, max_size: u64) -> Result<Upload, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut config = MaskRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("files") => {
                let filename = field
                    .file_name()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or("avatar")
                    .to_string();
                file = Some((filename, read_field(field, max_size).await?));
            }
            Some("config") => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    config = serde_json::from_str(&text)
                        .map_err(|e| AppError::Validation(format!("Invalid config: {e}")))?;
                }
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| AppError::Validation("Missing 'files' field".into()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".into()));
    }

    Ok(Upload {
        filename,
        bytes,
        mask: config.to_mask()?,
    })
}

async fn read_field(mut field: Field<'_>, max_size: u64) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (bytes.len() + chunk.len()) as u64 > max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds maximum size of {max_size} bytes"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Weak comparison of an `If-None-Match` value against the current ETag.
/// The value may list several tags, any of them weak.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("Multipart error: {e}"))
    }
}
