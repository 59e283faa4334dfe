use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::services::attachment_service::AttachmentService;
use crate::state::AppState;
use crate::storage::sanitize_filename;

pub async fn download_attachment(
    State(state): State<AppState>,
    user: User,
    Path(attachment_id): Path<Uuid>,
) -> Result<(HeaderMap, Vec<u8>), AppError> {
    let (attachment, bytes) =
        AttachmentService::download(&state.db, state.storage.as_ref(), user.id, attachment_id)
            .await?;

    // Sanitized at upload too, but never trust a stored name in a header.
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&attachment.original_name).replace('"', "_")
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|_| AppError::Internal)?,
    );
    Ok((headers, bytes))
}

pub async fn remove_attachment(
    State(state): State<AppState>,
    user: User,
    Path(attachment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    AttachmentService::remove(&state.db, state.storage.as_ref(), user.id, attachment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
