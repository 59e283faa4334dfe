use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::attachment::Attachment;
use crate::models::message::{Importance, Message};
use crate::services::message_service::{
    AttachmentUpload, Composition, ListView, MessageService,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Free-text filter over subject, body and counterpart name.
    pub q: Option<String>,
}

/// List-view row: the message plus the other party as seen by the caller.
#[derive(Debug, Serialize)]
pub struct MessageSummary {
    pub id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub counterpart_id: Uuid,
    pub counterpart_name: String,
    pub subject: Option<String>,
    pub body: String,
    pub importance: Importance,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct AttachmentDto {
    pub id: Uuid,
    pub file_name: String,
    pub size_bytes: Option<i64>,
}

impl From<Attachment> for AttachmentDto {
    fn from(a: Attachment) -> Self {
        Self {
            id: a.id,
            file_name: a.original_name,
            size_bytes: a.size_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageDetail {
    pub id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: Option<String>,
    pub body: String,
    pub importance: Importance,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub attachments: Vec<AttachmentDto>,
}

impl MessageDetail {
    fn from_parts(message: Message, attachments: Vec<Attachment>) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            subject: message.subject,
            body: message.body,
            importance: message.importance,
            sent_at: message.sent_at,
            is_read: message.is_read,
            attachments: attachments.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    pub recipient_id: Uuid,
    pub subject: Option<String>,
    pub body: String,
    /// "low" | "normal" | "high"; defaults to "normal".
    pub importance: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub body: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

fn decode_attachments(payloads: Vec<AttachmentPayload>) -> Result<Vec<AttachmentUpload>, AppError> {
    payloads
        .into_iter()
        .map(|p| {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&p.content_base64)
                .map_err(|_| {
                    AppError::validation(
                        "attachments",
                        format!("attachment {:?} is not valid base64", p.file_name),
                    )
                })?;
            Ok(AttachmentUpload {
                file_name: p.file_name,
                bytes,
            })
        })
        .collect()
}

pub async fn compose_message(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<ComposeRequest>,
) -> Result<(StatusCode, Json<MessageDetail>), AppError> {
    let attachments = decode_attachments(body.attachments)?;
    let importance = body
        .importance
        .as_deref()
        .map(Importance::parse)
        .transpose()?
        .unwrap_or_default();
    let message = MessageService::compose(
        &state.db,
        state.storage.as_ref(),
        &state.config.attachments,
        user.id,
        Composition {
            recipient_id: body.recipient_id,
            subject: body.subject,
            body: body.body,
            importance,
            attachments,
            conversation_id: body.conversation_id,
        },
    )
    .await?;
    let attachments = MessageService::attachments_for(&state.db, message.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageDetail::from_parts(message, attachments)),
    ))
}

pub async fn reply_to_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<MessageDetail>), AppError> {
    let attachments = decode_attachments(body.attachments)?;
    let message = MessageService::reply(
        &state.db,
        state.storage.as_ref(),
        &state.config.attachments,
        message_id,
        user.id,
        body.body,
        body.subject,
        attachments,
    )
    .await?;
    let attachments = MessageService::attachments_for(&state.db, message.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageDetail::from_parts(message, attachments)),
    ))
}

pub async fn get_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageDetail>, AppError> {
    let (message, attachments) = MessageService::get_message(&state.db, user.id, message_id).await?;
    Ok(Json(MessageDetail::from_parts(message, attachments)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::delete(&state.db, state.storage.as_ref(), user.id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_message_read(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::mark_read(&state.db, user.id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn archive_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::set_archived(&state.db, user.id, message_id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unarchive_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::set_archived(&state.db, user.id, message_id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list(
    state: AppState,
    user: User,
    view: ListView,
    query: ListQuery,
) -> Result<Json<Vec<MessageSummary>>, AppError> {
    let rows = MessageService::list(&state.db, user.id, view, query.q.as_deref()).await?;
    Ok(Json(rows))
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MessageSummary>>, AppError> {
    list(state, user, ListView::All, query).await
}

pub async fn list_inbox(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MessageSummary>>, AppError> {
    list(state, user, ListView::Inbox, query).await
}

pub async fn list_sent(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MessageSummary>>, AppError> {
    list(state, user, ListView::Sent, query).await
}

pub async fn list_archived(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MessageSummary>>, AppError> {
    list(state, user, ListView::Archived, query).await
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread = MessageService::unread_count(&state.db, user.id).await?;
    Ok(Json(UnreadCountResponse { unread }))
}
