pub mod admin;
pub mod health;
pub mod notifications;
pub mod ws;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use vidhub_shared::middleware::metrics_middleware;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ws/notifications", get(ws::notifications_socket))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/mark-all-read", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/notifications/:id/unread", post(notifications::mark_unread))
        .route("/admin/notifications", get(admin::search_notifications))
        .route("/admin/notifications/send", post(admin::send_notification))
        .route("/admin/notifications/mark-read", post(admin::bulk_set_read))
        .route("/admin/notifications/:id", delete(admin::delete_notification))
        .route("/admin/notifications/:id/read", put(admin::set_read))
        .route(
            "/admin/users/:id/notifications",
            get(admin::list_for_user).delete(admin::purge_for_user),
        )
        .route_layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
