use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use vidhub_shared::errors::AppResult;

use super::{notification_not_found, recipient_not_found, NotificationFilter, NotificationStore};
use crate::models::Notification;

#[derive(Default)]
struct Inner {
    /// User id to username.
    users: HashMap<Uuid, String>,
    /// Accept any recipient, recording it as a user on first use.
    open_registration: bool,
    /// Record plus its insertion sequence, which orders records created within
    /// the same clock tick.
    notifications: HashMap<Uuid, (u64, Notification)>,
    next_seq: u64,
}

impl Inner {
    fn sorted_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.sorted_where(|n| n.user_id == user_id)
    }

    fn sorted_where(&self, keep: impl Fn(&Notification) -> bool) -> Vec<Notification> {
        let mut rows: Vec<&(u64, Notification)> = self
            .notifications
            .values()
            .filter(|(_, n)| keep(n))
            .collect();
        rows.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq))
        });
        rows.into_iter().map(|(_, n)| n.clone()).collect()
    }
}

fn window(rows: Vec<Notification>, limit: i64, offset: i64) -> (Vec<Notification>, i64) {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(0))
        .take(usize::try_from(limit).unwrap_or(0))
        .collect();
    (items, total)
}

/// Process-local store for development and tests. Keeps its own user table so
/// recipient validation and delete cascades behave like the Postgres schema.
#[derive(Default)]
pub struct MemoryNotificationStore {
    inner: Mutex<Inner>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with no user table of its own to check against. Used when the
    /// service runs without Postgres, where nothing else knows the users.
    pub fn with_open_registration() -> Self {
        let store = Self::default();
        store.lock().open_registration = true;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, user_id: Uuid) {
        self.add_named_user(user_id, "");
    }

    pub fn add_named_user(&self, user_id: Uuid, username: &str) {
        self.lock().users.insert(user_id, username.to_string());
    }

    /// Remove a user and, like `ON DELETE CASCADE`, all of their notifications.
    pub fn remove_user(&self, user_id: Uuid) -> usize {
        let mut inner = self.lock();
        inner.users.remove(&user_id);
        let before = inner.notifications.len();
        inner.notifications.retain(|_, (_, n)| n.user_id != user_id);
        before - inner.notifications.len()
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn create(&self, recipient: Uuid, message: &str) -> AppResult<Notification> {
        let mut inner = self.lock();
        if inner.open_registration {
            inner.users.entry(recipient).or_default();
        } else if !inner.users.contains_key(&recipient) {
            return Err(recipient_not_found(recipient));
        }

        let notification = Notification {
            id: Uuid::now_v7(),
            user_id: recipient,
            message: message.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.notifications.insert(notification.id, (seq, notification.clone()));

        tracing::debug!(notification_id = %notification.id, user_id = %recipient, "notification created");
        Ok(notification)
    }

    fn mark_read(&self, id: Uuid, read: bool) -> AppResult<Notification> {
        let mut inner = self.lock();
        let (_, notification) = inner
            .notifications
            .get_mut(&id)
            .ok_or_else(|| notification_not_found(id))?;
        notification.is_read = read;
        Ok(notification.clone())
    }

    fn mark_read_for_user(&self, id: Uuid, user_id: Uuid, read: bool) -> AppResult<Notification> {
        let mut inner = self.lock();
        match inner.notifications.get_mut(&id) {
            Some((_, notification)) if notification.user_id == user_id => {
                notification.is_read = read;
                Ok(notification.clone())
            }
            _ => Err(notification_not_found(id)),
        }
    }

    fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>> {
        Ok(self.lock().sorted_for(user_id))
    }

    fn list_page(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)> {
        Ok(window(self.lock().sorted_for(user_id), limit, offset))
    }

    fn search(&self, filter: &NotificationFilter, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)> {
        let inner = self.lock();
        let term = filter.search_term().map(str::to_lowercase);

        let matches = inner.sorted_where(|n| {
            filter.is_read.map_or(true, |read| n.is_read == read)
                && filter.user_id.map_or(true, |user_id| n.user_id == user_id)
                && filter.created_after.map_or(true, |after| n.created_at >= after)
                && filter.created_before.map_or(true, |before| n.created_at < before)
                && term.as_deref().map_or(true, |term| {
                    n.message.to_lowercase().contains(term)
                        || inner
                            .users
                            .get(&n.user_id)
                            .is_some_and(|username| username.to_lowercase().contains(term))
                })
        });

        Ok(window(matches, limit, offset))
    }

    fn set_read_many(&self, ids: &[Uuid], read: bool) -> AppResult<usize> {
        let mut inner = self.lock();
        let mut updated = 0;
        for id in ids.iter().collect::<HashSet<_>>() {
            if let Some((_, n)) = inner.notifications.get_mut(id) {
                n.is_read = read;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn count_unread(&self, user_id: Uuid) -> AppResult<i64> {
        let inner = self.lock();
        let count = inner
            .notifications
            .values()
            .filter(|(_, n)| n.user_id == user_id && !n.is_read)
            .count();
        Ok(count as i64)
    }

    fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut inner = self.lock();
        let mut updated = 0;
        for (_, n) in inner.notifications.values_mut() {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn delete(&self, id: Uuid) -> AppResult<()> {
        self.lock()
            .notifications
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| notification_not_found(id))
    }

    fn purge_for_user(&self, user_id: Uuid) -> AppResult<usize> {
        let mut inner = self.lock();
        let before = inner.notifications.len();
        inner.notifications.retain(|_, (_, n)| n.user_id != user_id);
        Ok(before - inner.notifications.len())
    }

    fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidhub_shared::errors::ErrorCode;

    fn store_with_user() -> (MemoryNotificationStore, Uuid) {
        let store = MemoryNotificationStore::new();
        let user = Uuid::new_v4();
        store.add_user(user);
        (store, user)
    }

    #[test]
    fn create_starts_unread() {
        let (store, user) = store_with_user();
        let n = store.create(user, "new video uploaded").unwrap();

        assert_eq!(n.user_id, user);
        assert_eq!(n.message, "new video uploaded");
        assert!(!n.is_read);
        assert_eq!(store.count_unread(user).unwrap(), 1);
    }

    #[test]
    fn unknown_recipient_is_not_found() {
        let store = MemoryNotificationStore::new();
        let err = store.create(Uuid::new_v4(), "hello").unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecipientNotFound);
    }

    #[test]
    fn read_toggle_restores_unread() {
        let (store, user) = store_with_user();
        let n = store.create(user, "hi").unwrap();

        assert!(store.mark_read(n.id, true).unwrap().is_read);
        let back = store.mark_read(n.id, false).unwrap();
        assert!(!back.is_read);
        assert_eq!(back.created_at, n.created_at);
        assert_eq!(store.list_for_user(user).unwrap(), vec![n]);
    }

    #[test]
    fn mark_read_unknown_id() {
        let store = MemoryNotificationStore::new();
        let err = store.mark_read(Uuid::new_v4(), true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotificationNotFound);
    }

    #[test]
    fn owner_scoped_toggle_hides_other_users_records() {
        let (store, owner) = store_with_user();
        let other = Uuid::new_v4();
        store.add_user(other);
        let n = store.create(owner, "private").unwrap();

        let err = store.mark_read_for_user(n.id, other, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotificationNotFound);
        assert!(store.mark_read_for_user(n.id, owner, true).unwrap().is_read);
    }

    #[test]
    fn listing_is_newest_first_and_stable() {
        let (store, user) = store_with_user();
        let first = store.create(user, "one").unwrap();
        let second = store.create(user, "two").unwrap();
        let third = store.create(user, "three").unwrap();

        let listed = store.list_for_user(user).unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert_eq!(store.list_for_user(user).unwrap(), listed);
    }

    #[test]
    fn paging_windows_the_sorted_list() {
        let (store, user) = store_with_user();
        for i in 0..5 {
            store.create(user, &format!("n{i}")).unwrap();
        }

        let (page, total) = store.list_page(user, 2, 2).unwrap();
        assert_eq!(total, 5);
        let messages: Vec<&str> = page.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["n2", "n1"]);
    }

    #[test]
    fn mark_all_read_only_touches_unread() {
        let (store, user) = store_with_user();
        let a = store.create(user, "a").unwrap();
        store.create(user, "b").unwrap();
        store.mark_read(a.id, true).unwrap();

        assert_eq!(store.mark_all_read(user).unwrap(), 1);
        assert_eq!(store.count_unread(user).unwrap(), 0);
    }

    #[test]
    fn delete_and_purge() {
        let (store, user) = store_with_user();
        let a = store.create(user, "a").unwrap();
        store.create(user, "b").unwrap();
        store.create(user, "c").unwrap();

        store.delete(a.id).unwrap();
        assert_eq!(store.delete(a.id).unwrap_err().code(), ErrorCode::NotificationNotFound);
        assert_eq!(store.purge_for_user(user).unwrap(), 2);
        assert!(store.list_for_user(user).unwrap().is_empty());
    }

    #[test]
    fn removing_user_cascades() {
        let (store, user) = store_with_user();
        store.create(user, "a").unwrap();
        store.create(user, "b").unwrap();

        assert_eq!(store.remove_user(user), 2);
        assert!(store.list_for_user(user).unwrap().is_empty());
        assert!(store.create(user, "c").is_err());
    }

    #[test]
    fn open_registration_accepts_unknown_recipients() {
        let store = MemoryNotificationStore::with_open_registration();
        let stranger = Uuid::new_v4();

        let n = store.create(stranger, "welcome").unwrap();
        assert_eq!(n.user_id, stranger);
        assert_eq!(store.count_unread(stranger).unwrap(), 1);
    }

    #[test]
    fn search_combines_filters() {
        let store = MemoryNotificationStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.add_named_user(alice, "Alice");
        store.add_named_user(bob, "bob");

        let upload = store.create(alice, "New video uploaded").unwrap();
        store.create(alice, "Weekly digest").unwrap();
        let comment = store.create(bob, "Someone commented on your VIDEO").unwrap();
        store.mark_read(comment.id, true).unwrap();

        let by_message = NotificationFilter { q: Some("  video ".into()), ..Default::default() };
        let (items, total) = store.search(&by_message, 10, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.iter().map(|n| n.id).collect::<Vec<_>>(), vec![comment.id, upload.id]);

        let unread_videos = NotificationFilter { is_read: Some(false), ..by_message };
        let (items, total) = store.search(&unread_videos, 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, upload.id);

        let by_username = NotificationFilter { q: Some("ALI".into()), ..Default::default() };
        assert_eq!(store.search(&by_username, 10, 0).unwrap().1, 2);

        let by_user = NotificationFilter { user_id: Some(bob), ..Default::default() };
        let (items, _) = store.search(&by_user, 10, 0).unwrap();
        assert_eq!(items.iter().map(|n| n.id).collect::<Vec<_>>(), vec![comment.id]);
    }

    #[test]
    fn search_date_bounds_and_paging() {
        let (store, user) = store_with_user();
        let first = store.create(user, "a").unwrap();
        store.create(user, "b").unwrap();
        store.create(user, "c").unwrap();

        let everything = NotificationFilter::default();
        let (page, total) = store.search(&everything, 1, 1).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page[0].message, "b");

        let before_first = NotificationFilter { created_before: Some(first.created_at), ..Default::default() };
        assert_eq!(store.search(&before_first, 10, 0).unwrap().1, 0);

        let from_first = NotificationFilter { created_after: Some(first.created_at), ..Default::default() };
        assert_eq!(store.search(&from_first, 10, 0).unwrap().1, 3);
    }

    #[test]
    fn set_read_many_counts_existing_ids_once() {
        let (store, user) = store_with_user();
        let a = store.create(user, "a").unwrap();
        let b = store.create(user, "b").unwrap();
        store.create(user, "c").unwrap();

        let ids = [a.id, b.id, a.id, Uuid::new_v4()];
        assert_eq!(store.set_read_many(&ids, true).unwrap(), 2);
        assert_eq!(store.count_unread(user).unwrap(), 1);

        assert_eq!(store.set_read_many(&[b.id], false).unwrap(), 1);
        assert_eq!(store.count_unread(user).unwrap(), 2);
    }
}
