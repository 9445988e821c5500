use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use uuid::Uuid;

use crate::delivery::{DeliveryChannel, DeliveryEvent};
use crate::presence::GroupKey;
use crate::store::NotificationStore;

/// The admin "send a message to these users" operation.
///
/// Each recipient is handled on its own: persist first, then publish to the
/// recipient's group. The two steps are not transactional. A stored record
/// stays even if nobody is connected or the push fails, and a recipient whose
/// record could not be stored is skipped without affecting the others.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    channel: DeliveryChannel,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, channel: DeliveryChannel) -> Self {
        Self { store, channel }
    }

    /// Returns how many recipients got a persisted record. Duplicate ids count once.
    pub async fn send(&self, recipients: &[Uuid], message: &str) -> usize {
        let recipients: BTreeSet<Uuid> = recipients.iter().copied().collect();
        let mut persisted = 0;
        let mut live = 0;

        for recipient in &recipients {
            let notification = match self.store.create(*recipient, message) {
                Ok(n) => n,
                Err(e) => {
                    counter!("notifications_failed_total").increment(1);
                    tracing::warn!(user_id = %recipient, error = %e, "failed to persist notification");
                    continue;
                }
            };
            persisted += 1;
            counter!("notifications_persisted_total").increment(1);

            let delivered = self
                .channel
                .publish(
                    &GroupKey::for_user(*recipient),
                    DeliveryEvent::Notification { message: notification.message },
                )
                .await;
            if delivered > 0 {
                live += 1;
            }
        }

        tracing::info!(
            requested = recipients.len(),
            persisted,
            delivered_live = live,
            "notification batch dispatched"
        );

        persisted
    }
}
