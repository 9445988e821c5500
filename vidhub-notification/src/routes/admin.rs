use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use vidhub_shared::errors::AppResult;
use vidhub_shared::middleware::AdminUser;
use vidhub_shared::types::api::ApiResponse;
use vidhub_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::Notification;
use crate::store::NotificationFilter;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SendNotificationRequest {
    #[validate(length(min = 1, max = 1000, message = "between 1 and 1000 recipients are required"))]
    pub user_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub sent: usize,
    pub requested: usize,
}

/// POST /admin/notifications/send
/// Persist a message for every selected user and push it to whoever is online.
pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<SendNotificationRequest>,
) -> AppResult<Json<ApiResponse<SendNotificationResponse>>> {
    req.validate()?;

    let sent = state.dispatcher.send(&req.user_ids, &req.message).await;

    tracing::info!(admin_id = %admin.id, requested = req.user_ids.len(), sent, "admin notification sent");

    Ok(Json(ApiResponse::ok_with_message(
        SendNotificationResponse {
            sent,
            requested: req.user_ids.len(),
        },
        format!("Notifications sent to {sent} users."),
    )))
}

/// GET /admin/users/:id/notifications
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let notifications = state.store.list_for_user(user_id)?;
    Ok(Json(ApiResponse::ok(notifications)))
}

/// GET /admin/notifications
/// Every user's notifications, newest first, narrowed by the query filters.
pub async fn search_notifications(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<NotificationFilter>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let (limit, offset) = params.sql_window();

    let (items, total) = state.store.search(&filter, limit, offset)?;

    let paginated = Paginated::new(items, total as u64, &params);
    Ok(Json(ApiResponse::ok(paginated)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkSetReadRequest {
    #[validate(length(min = 1, max = 1000, message = "between 1 and 1000 ids are required"))]
    pub ids: Vec<Uuid>,
    pub read: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkSetReadResponse {
    pub updated: usize,
}

/// POST /admin/notifications/mark-read
/// Set the read flag on a batch of notifications. Unknown ids are skipped.
pub async fn bulk_set_read(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<BulkSetReadRequest>,
) -> AppResult<Json<ApiResponse<BulkSetReadResponse>>> {
    req.validate()?;

    let updated = state.store.set_read_many(&req.ids, req.read)?;

    tracing::info!(admin_id = %admin.id, requested = req.ids.len(), updated, read = req.read, "bulk read flag set");

    let state_label = if req.read { "read" } else { "unread" };
    Ok(Json(ApiResponse::ok_with_message(
        BulkSetReadResponse { updated },
        format!("{updated} notifications marked as {state_label}."),
    )))
}

#[derive(Debug, Deserialize)]
pub struct SetReadRequest {
    pub read: bool,
}

/// PUT /admin/notifications/:id/read
pub async fn set_read(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetReadRequest>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = state.store.mark_read(id, req.read)?;

    tracing::info!(admin_id = %admin.id, notification_id = %id, read = req.read, "notification read flag set");

    Ok(Json(ApiResponse::ok(notification)))
}

/// DELETE /admin/notifications/:id
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.store.delete(id)?;

    tracing::info!(admin_id = %admin.id, notification_id = %id, "notification deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub deleted: usize,
}

/// DELETE /admin/users/:id/notifications
pub async fn purge_for_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PurgeResponse>>> {
    let deleted = state.store.purge_for_user(user_id)?;

    tracing::info!(admin_id = %admin.id, user_id = %user_id, deleted, "user notifications purged");

    Ok(Json(ApiResponse::ok(PurgeResponse { deleted })))
}
