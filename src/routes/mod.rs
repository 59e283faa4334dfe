use crate::state::AppState;
use axum::middleware;
use axum::{
    routing::{delete, get, post},
    Json, Router,
};

pub mod attachments;
pub mod messages;

use attachments::{download_attachment, remove_attachment};
use messages::{
    archive_message, compose_message, delete_message, get_message, list_archived, list_inbox,
    list_messages, list_sent, mark_message_read, reply_to_message, unarchive_message,
    unread_count,
};

// OpenAPI endpoint handler
async fn openapi_json() -> Json<serde_json::Value> {
    use utoipa::OpenApi;
    Json(serde_json::to_value(crate::openapi::ApiDoc::openapi()).unwrap_or_default())
}

pub fn build_router(state: AppState) -> Router {
    // Service introspection endpoints (no API version prefix, no auth)
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(crate::openapi::ApiDoc::openapi_json_path(), get(openapi_json));

    let api_v1 = Router::new()
        .route("/messages", get(list_messages).post(compose_message))
        .route("/messages/inbox", get(list_inbox))
        .route("/messages/sent", get(list_sent))
        .route("/messages/archived", get(list_archived))
        .route("/messages/unread-count", get(unread_count))
        .route("/messages/:id", get(get_message).delete(delete_message))
        .route("/messages/:id/reply", post(reply_to_message))
        .route("/messages/:id/read", post(mark_message_read))
        .route("/messages/:id/archive", post(archive_message))
        .route("/messages/:id/unarchive", post(unarchive_message))
        .route("/attachments/:id/download", get(download_attachment))
        .route("/attachments/:id", delete(remove_attachment));

    // Auth applies to the API tree only; introspection stays public for
    // healthchecks.
    let secured_api_v1 = api_v1.layer(middleware::from_fn_with_state(
        state.clone(),
        crate::middleware::auth::auth_middleware,
    ));

    let router = introspection.merge(Router::new().nest("/api/v1", secured_api_v1));

    crate::middleware::with_defaults(router).with_state(state)
}
