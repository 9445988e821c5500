use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{DeliveryError, DeliveryEvent};

pub type Mailbox = mpsc::UnboundedReceiver<DeliveryEvent>;

/// Mailboxes of the connections open on this process, keyed by connection id.
///
/// A session owns the receiving end; everything that wants to reach the
/// socket goes through [`deliver`](ConnectionHub::deliver).
#[derive(Default)]
pub struct ConnectionHub {
    mailboxes: DashMap<Uuid, mpsc::UnboundedSender<DeliveryEvent>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: Uuid) -> Mailbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(connection_id, tx);
        rx
    }

    /// Returns whether a mailbox was registered.
    pub fn unregister(&self, connection_id: Uuid) -> bool {
        self.mailboxes.remove(&connection_id).is_some()
    }

    pub fn deliver(&self, connection_id: Uuid, event: DeliveryEvent) -> Result<(), DeliveryError> {
        let sender = self
            .mailboxes
            .get(&connection_id)
            .ok_or(DeliveryError::ConnectionGone(connection_id))?;

        if sender.send(event).is_err() {
            drop(sender);
            self.mailboxes.remove(&connection_id);
            return Err(DeliveryError::ConnectionGone(connection_id));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> DeliveryEvent {
        DeliveryEvent::Notification { message: "m".into() }
    }

    #[tokio::test]
    async fn delivers_to_registered_mailbox() {
        let hub = ConnectionHub::new();
        let id = Uuid::new_v4();
        let mut rx = hub.register(id);

        hub.deliver(id, event()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), event());
    }

    #[test]
    fn unknown_connection_is_gone() {
        let hub = ConnectionHub::new();
        let err = hub.deliver(Uuid::new_v4(), event()).unwrap_err();
        assert!(matches!(err, DeliveryError::ConnectionGone(_)));
    }

    #[test]
    fn dropped_receiver_is_cleaned_up() {
        let hub = ConnectionHub::new();
        let id = Uuid::new_v4();
        drop(hub.register(id));

        assert!(hub.deliver(id, event()).is_err());
        assert!(hub.is_empty());
    }

    #[test]
    fn unregister_reports_presence() {
        let hub = ConnectionHub::new();
        let id = Uuid::new_v4();
        let _rx = hub.register(id);

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
    }
}
