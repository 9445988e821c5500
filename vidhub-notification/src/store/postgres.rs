use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use vidhub_shared::clients::db::{checkout, DbPool};
use vidhub_shared::errors::{AppError, AppResult};

use super::{notification_not_found, recipient_not_found, NotificationFilter, NotificationStore};
use crate::models::{NewNotification, Notification};
use crate::schema::{notifications, users};

/// Diesel-backed store. Recipient validity and delete cascades are enforced
/// by the `notifications.user_id` foreign key.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_not_found(id: Uuid) -> impl FnOnce(DieselError) -> AppError {
    move |e| match e {
        DieselError::NotFound => notification_not_found(id),
        other => AppError::Database(other),
    }
}

/// `%term%` with the LIKE wildcards in `term` taken literally.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn filtered(filter: &NotificationFilter) -> notifications::BoxedQuery<'static, Pg> {
    let mut query = notifications::table.into_boxed();

    if let Some(read) = filter.is_read {
        query = query.filter(notifications::is_read.eq(read));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(notifications::user_id.eq(user_id));
    }
    if let Some(after) = filter.created_after {
        query = query.filter(notifications::created_at.ge(after));
    }
    if let Some(before) = filter.created_before {
        query = query.filter(notifications::created_at.lt(before));
    }
    if let Some(term) = filter.search_term() {
        let pattern = contains_pattern(term);
        let matching_users = users::table
            .filter(users::username.ilike(pattern.clone()))
            .select(users::id);
        query = query.filter(
            notifications::message
                .ilike(pattern)
                .or(notifications::user_id.eq_any(matching_users)),
        );
    }

    query
}

impl NotificationStore for PgNotificationStore {
    fn create(&self, recipient: Uuid, message: &str) -> AppResult<Notification> {
        let mut conn = checkout(&self.pool)?;

        let new_notification = NewNotification {
            id: Uuid::now_v7(),
            user_id: recipient,
            message,
        };

        let notification = diesel::insert_into(notifications::table)
            .values(&new_notification)
            .returning(Notification::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    recipient_not_found(recipient)
                }
                other => AppError::Database(other),
            })?;

        tracing::debug!(
            notification_id = %notification.id,
            user_id = %recipient,
            "notification created"
        );

        Ok(notification)
    }

    fn mark_read(&self, id: Uuid, read: bool) -> AppResult<Notification> {
        let mut conn = checkout(&self.pool)?;

        diesel::update(notifications::table.find(id))
            .set(notifications::is_read.eq(read))
            .returning(Notification::as_returning())
            .get_result(&mut conn)
            .map_err(map_not_found(id))
    }

    fn mark_read_for_user(&self, id: Uuid, user_id: Uuid, read: bool) -> AppResult<Notification> {
        let mut conn = checkout(&self.pool)?;

        diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::is_read.eq(read))
        .returning(Notification::as_returning())
        .get_result(&mut conn)
        .map_err(map_not_found(id))
    }

    fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>> {
        let mut conn = checkout(&self.pool)?;

        let items = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .select(Notification::as_select())
            .load(&mut conn)?;

        Ok(items)
    }

    fn list_page(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)> {
        let mut conn = checkout(&self.pool)?;

        let total: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;

        let items = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(Notification::as_select())
            .load(&mut conn)?;

        Ok((items, total))
    }

    fn search(&self, filter: &NotificationFilter, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)> {
        let mut conn = checkout(&self.pool)?;

        let total: i64 = filtered(filter).count().get_result(&mut conn)?;

        let items = filtered(filter)
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(Notification::as_select())
            .load(&mut conn)?;

        Ok((items, total))
    }

    fn set_read_many(&self, ids: &[Uuid], read: bool) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;

        let updated = diesel::update(notifications::table.filter(notifications::id.eq_any(ids)))
            .set(notifications::is_read.eq(read))
            .execute(&mut conn)?;

        tracing::info!(requested = ids.len(), updated, read, "bulk read flag update");
        Ok(updated)
    }

    fn count_unread(&self, user_id: Uuid) -> AppResult<i64> {
        let mut conn = checkout(&self.pool)?;

        let count: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(&mut conn)?;

        Ok(count)
    }

    fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;

        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)?;

        Ok(updated)
    }

    fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;

        let deleted = diesel::delete(notifications::table.find(id)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(notification_not_found(id));
        }

        tracing::info!(notification_id = %id, "notification deleted");
        Ok(())
    }

    fn purge_for_user(&self, user_id: Uuid) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;

        let deleted = diesel::delete(notifications::table.filter(notifications::user_id.eq(user_id)))
            .execute(&mut conn)?;

        tracing::info!(user_id = %user_id, deleted, "notifications purged");
        Ok(deleted)
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}
