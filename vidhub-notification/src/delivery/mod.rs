//! Delivery Channel: best-effort fan-out of events to the live connections
//! of a group.
//!
//! `publish` resolves the group's current members through the presence
//! registry and forwards the event to each one through a [`Relay`]. Nothing
//! is queued: members that are not registered at publish time never see the
//! event, and a failed forward is logged and dropped.

mod hub;
mod relay;

pub use hub::{ConnectionHub, Mailbox};
pub use relay::{run_node_heartbeat, run_node_listener, LocalRelay, NodeBus, RedisRelay, RelayEnvelope};

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::{ConnectionHandle, GroupKey, PresenceRegistry};

/// Events a connection session can receive from the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeliveryEvent {
    Notification { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection {0} is not open on this node")]
    ConnectionGone(Uuid),

    #[error("node {0} is alive but has no relay listener")]
    NodeUnreachable(String),

    #[error("node {0} is gone")]
    NodeGone(String),

    #[error("relay broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("relay envelope codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl DeliveryError {
    /// The target will never accept this or any later event.
    fn is_stale_target(&self) -> bool {
        matches!(self, DeliveryError::ConnectionGone(_) | DeliveryError::NodeGone(_))
    }
}

/// Hands one event to one connection, wherever it lives.
#[axum::async_trait]
pub trait Relay: Send + Sync {
    async fn forward(&self, handle: &ConnectionHandle, event: &DeliveryEvent) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct DeliveryChannel {
    presence: Arc<dyn PresenceRegistry>,
    relay: Arc<dyn Relay>,
}

impl DeliveryChannel {
    pub fn new(presence: Arc<dyn PresenceRegistry>, relay: Arc<dyn Relay>) -> Self {
        Self { presence, relay }
    }

    /// Forward `event` to every current member of `group`.
    ///
    /// Returns the number of members the event was handed to. Never fails: a
    /// broken member is logged and skipped, and an unreachable registry counts
    /// as an empty group. Members whose connection is gone are pruned from
    /// the registry so a crashed process does not leave them behind forever.
    pub async fn publish(&self, group: &GroupKey, event: DeliveryEvent) -> usize {
        let members = match self.presence.members(group).await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!(group = %group, error = %e, "presence lookup failed, skipping live delivery");
                return 0;
            }
        };

        if members.is_empty() {
            tracing::debug!(group = %group, "no live connections, skipping live delivery");
            return 0;
        }

        let mut delivered = 0;
        for handle in &members {
            match self.relay.forward(handle, &event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    counter!("live_delivery_failures_total").increment(1);
                    tracing::warn!(group = %group, handle = %handle, error = %e, "live delivery failed");

                    if e.is_stale_target() {
                        if let Err(e) = self.presence.leave(group, handle).await {
                            tracing::warn!(group = %group, handle = %handle, error = %e, "failed to prune stale presence");
                        }
                    }
                }
            }
        }

        counter!("live_deliveries_total").increment(delivered as u64);
        tracing::debug!(group = %group, members = members.len(), delivered, "event published");
        delivered
    }
}
