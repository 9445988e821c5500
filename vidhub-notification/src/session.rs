//! Connection Session: the lifecycle of one live connection.
//!
//! ```text
//! Connecting --open(authenticated)--> Open --close()--> Closed
//!     \-------open(anonymous)--------------------------> Closed
//! ```
//!
//! Entering `Open` registers the connection's mailbox in the hub and joins
//! `user_{id}` in the presence registry; leaving it undoes both, once.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use vidhub_shared::errors::{AppError, AppResult, ErrorCode};
use vidhub_shared::types::auth::AuthUser;

use crate::delivery::{ConnectionHub, DeliveryEvent, Mailbox};
use crate::presence::{ConnectionHandle, GroupKey, PresenceRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Server-to-client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Notification { message: String },
}

impl From<DeliveryEvent> for ServerFrame {
    fn from(event: DeliveryEvent) -> Self {
        match event {
            DeliveryEvent::Notification { message } => ServerFrame::Notification { message },
        }
    }
}

pub struct ConnectionSession {
    handle: ConnectionHandle,
    presence: Arc<dyn PresenceRegistry>,
    hub: Arc<ConnectionHub>,
    state: SessionState,
    group: Option<GroupKey>,
    user_id: Option<Uuid>,
}

impl ConnectionSession {
    pub fn new(node_id: &str, presence: Arc<dyn PresenceRegistry>, hub: Arc<ConnectionHub>) -> Self {
        Self {
            handle: ConnectionHandle::new(node_id, Uuid::new_v4()),
            presence,
            hub,
            state: SessionState::Connecting,
            group: None,
            user_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Move out of `Connecting`. Without an identity the session closes
    /// immediately and nothing is registered.
    ///
    /// On success returns the mailbox that delivery events arrive on.
    pub async fn open(&mut self, identity: Option<&AuthUser>) -> AppResult<Mailbox> {
        if self.state != SessionState::Connecting {
            return Err(AppError::bad_request("session already opened"));
        }

        let Some(user) = identity else {
            self.state = SessionState::Closed;
            return Err(AppError::new(ErrorCode::AuthenticationRequired, "authentication required"));
        };

        let group = GroupKey::for_user(user.id);
        let mailbox = self.hub.register(self.handle.connection_id);

        if let Err(e) = self.presence.join(&group, &self.handle).await {
            tracing::error!(group = %group, handle = %self.handle, error = %e, "failed to join presence group");
            self.hub.unregister(self.handle.connection_id);
            self.state = SessionState::Closed;
            return Err(AppError::new(ErrorCode::PresenceUnavailable, "presence registry unavailable"));
        }

        tracing::info!(user_id = %user.id, handle = %self.handle, "notification socket opened");

        self.group = Some(group);
        self.user_id = Some(user.id);
        self.state = SessionState::Open;
        Ok(mailbox)
    }

    /// Inbound client frames carry no meaning yet; they are accepted and dropped.
    pub fn handle_client_message(&self, text: &str) {
        tracing::trace!(handle = %self.handle, len = text.len(), "ignoring client frame");
    }

    /// Serialize a delivery event into the text frame sent to the client.
    pub fn render(&self, event: DeliveryEvent) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ServerFrame::from(event))
    }

    /// Leave `Open`. Safe to call any number of times; only the first call
    /// deregisters. Returns whether this call did the deregistration.
    pub async fn close(&mut self) -> bool {
        let was_open = self.state == SessionState::Open;
        self.state = SessionState::Closed;
        if !was_open {
            return false;
        }

        self.hub.unregister(self.handle.connection_id);
        if let Some(group) = self.group.take() {
            if let Err(e) = self.presence.leave(&group, &self.handle).await {
                tracing::warn!(group = %group, handle = %self.handle, error = %e, "failed to leave presence group");
            }
        }

        if let Some(user_id) = self.user_id {
            tracing::info!(user_id = %user_id, handle = %self.handle, "notification socket closed");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidhub_shared::types::auth::UserRole;

    use crate::presence::LocalPresence;

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role: UserRole::User,
            token_id: Uuid::new_v4(),
        }
    }

    fn session() -> (ConnectionSession, Arc<LocalPresence>, Arc<ConnectionHub>) {
        let presence = Arc::new(LocalPresence::new());
        let hub = Arc::new(ConnectionHub::new());
        (ConnectionSession::new("n1", presence.clone(), hub.clone()), presence, hub)
    }

    #[tokio::test]
    async fn anonymous_open_closes_without_state() {
        let (mut session, presence, hub) = session();

        let err = session.open(None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationRequired);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(presence.group_count(), 0);
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn open_joins_the_users_group() {
        let (mut session, presence, hub) = session();
        let user = user();

        let _mailbox = session.open(Some(&user)).await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(hub.len(), 1);

        let members = presence.members(&GroupKey::for_user(user.id)).await.unwrap();
        assert!(members.contains(session.handle()));
    }

    #[tokio::test]
    async fn close_deregisters_exactly_once() {
        let (mut session, presence, hub) = session();
        let user = user();
        let _mailbox = session.open(Some(&user)).await.unwrap();

        assert!(session.close().await);
        assert!(!session.close().await);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(presence.members(&GroupKey::for_user(user.id)).await.unwrap().is_empty());
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn closing_one_connection_keeps_the_others() {
        let presence = Arc::new(LocalPresence::new());
        let hub = Arc::new(ConnectionHub::new());
        let user = user();
        let mut tab_a = ConnectionSession::new("n1", presence.clone(), hub.clone());
        let mut tab_b = ConnectionSession::new("n1", presence.clone(), hub.clone());
        let _a = tab_a.open(Some(&user)).await.unwrap();
        let _b = tab_b.open(Some(&user)).await.unwrap();

        tab_a.close().await;

        let members = presence.members(&GroupKey::for_user(user.id)).await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains(tab_b.handle()));
    }

    #[tokio::test]
    async fn cannot_reopen() {
        let (mut session, _presence, _hub) = session();
        let user = user();
        let _mailbox = session.open(Some(&user)).await.unwrap();
        session.close().await;

        assert!(session.open(Some(&user)).await.is_err());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn notification_frame_shape() {
        let (session, _presence, _hub) = session();
        let frame = session
            .render(DeliveryEvent::Notification { message: "New video: Intro to GIS".into() })
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "message": "New video: Intro to GIS", "type": "notification" })
        );
    }
}
