//! Durable per-user notification records.
//!
//! The store is the source of truth: live delivery is only a latency
//! optimisation on top of it, and a user who was offline sees every record
//! here on their next fetch.

mod memory;
mod postgres;

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use vidhub_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Notification;

/// Listing order for every read path: newest first, ties broken so repeated
/// reads without intervening writes return the same sequence.
pub trait NotificationStore: Send + Sync {
    /// Persist a new unread notification for `recipient`.
    ///
    /// Fails with [`ErrorCode::RecipientNotFound`] if the user does not exist.
    fn create(&self, recipient: Uuid, message: &str) -> AppResult<Notification>;

    /// Set the read flag of any notification (admin action).
    fn mark_read(&self, id: Uuid, read: bool) -> AppResult<Notification>;

    /// Set the read flag of a notification owned by `user_id`. Someone else's
    /// notification is reported as not found.
    fn mark_read_for_user(&self, id: Uuid, user_id: Uuid, read: bool) -> AppResult<Notification>;

    fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>>;

    /// One page of [`list_for_user`](Self::list_for_user) plus the total count.
    fn list_page(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)>;

    /// One page of notifications across all users matching `filter`, plus the
    /// total match count (admin listing).
    fn search(&self, filter: &NotificationFilter, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)>;

    /// Set the read flag on every listed notification that exists; unknown ids
    /// are skipped. Returns how many records matched.
    fn set_read_many(&self, ids: &[Uuid], read: bool) -> AppResult<usize>;

    fn count_unread(&self, user_id: Uuid) -> AppResult<i64>;

    /// Mark every unread notification of the user as read; returns how many changed.
    fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize>;

    fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Delete all of a user's notifications; returns how many were removed.
    fn purge_for_user(&self, user_id: Uuid) -> AppResult<usize>;

    /// Cheap liveness check for `/health`.
    fn ping(&self) -> AppResult<()>;
}

/// Admin listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    pub is_read: Option<bool>,
    pub user_id: Option<Uuid>,
    /// Case-insensitive substring of the message or the recipient's username.
    pub q: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
}

impl NotificationFilter {
    /// The trimmed search term, if there is one left.
    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

pub(crate) fn notification_not_found(id: Uuid) -> AppError {
    AppError::with_details(
        ErrorCode::NotificationNotFound,
        "notification not found",
        serde_json::json!({ "notification_id": id }),
    )
}

pub(crate) fn recipient_not_found(user_id: Uuid) -> AppError {
    AppError::with_details(
        ErrorCode::RecipientNotFound,
        "recipient not found",
        serde_json::json!({ "user_id": user_id }),
    )
}
