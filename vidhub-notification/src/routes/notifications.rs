use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use vidhub_shared::errors::AppResult;
use vidhub_shared::types::api::ApiResponse;
use vidhub_shared::types::auth::AuthUser;
use vidhub_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::Notification;
use crate::AppState;

/// GET /notifications
/// The caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let (limit, offset) = params.sql_window();

    let (items, total) = state.store.list_page(auth_user.id, limit, offset)?;

    let paginated = Paginated::new(items, total as u64, &params);
    Ok(Json(ApiResponse::ok(paginated)))
}

/// GET /notifications/unread-count
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let count = state.store.count_unread(auth_user.id)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { count })))
}

#[derive(Debug, serde::Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// POST /notifications/mark-all-read
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<MarkAllReadResponse>>> {
    let updated = state.store.mark_all_read(auth_user.id)?;

    Ok(Json(ApiResponse::ok(MarkAllReadResponse { updated })))
}

#[derive(Debug, serde::Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// POST /notifications/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = state.store.mark_read_for_user(id, auth_user.id, true)?;

    Ok(Json(ApiResponse::ok(notification)))
}

/// POST /notifications/:id/unread
pub async fn mark_unread(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = state.store.mark_read_for_user(id, auth_user.id, false)?;

    Ok(Json(ApiResponse::ok(notification)))
}
