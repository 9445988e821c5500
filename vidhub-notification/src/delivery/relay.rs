use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vidhub_shared::clients::redis::RedisClient;

use super::{ConnectionHub, DeliveryError, DeliveryEvent, Relay};
use crate::presence::ConnectionHandle;

const NODE_CHANNEL_PREFIX: &str = "vidhub:node:";
const NODE_ALIVE_PREFIX: &str = "vidhub:node-alive:";

/// How often a node refreshes its liveness key, and how long the key outlives
/// the last refresh.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const HEARTBEAT_TTL_SECS: u64 = 30;

fn node_channel(node_id: &str) -> String {
    format!("{NODE_CHANNEL_PREFIX}{node_id}")
}

fn node_alive_key(node_id: &str) -> String {
    format!("{NODE_ALIVE_PREFIX}{node_id}")
}

/// Relay for single-process deployments: every handle lives in this hub.
pub struct LocalRelay {
    node_id: String,
    hub: Arc<ConnectionHub>,
}

impl LocalRelay {
    pub fn new(node_id: impl Into<String>, hub: Arc<ConnectionHub>) -> Self {
        Self { node_id: node_id.into(), hub }
    }
}

#[axum::async_trait]
impl Relay for LocalRelay {
    async fn forward(&self, handle: &ConnectionHandle, event: &DeliveryEvent) -> Result<(), DeliveryError> {
        if handle.node_id != self.node_id {
            return Err(DeliveryError::NodeGone(handle.node_id.clone()));
        }
        self.hub.deliver(handle.connection_id, event.clone())
    }
}

/// What travels on a node channel: the target connection and its event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub connection_id: Uuid,
    #[serde(flatten)]
    pub event: DeliveryEvent,
}

/// Broker operations the cross-node relay relies on.
#[axum::async_trait]
pub trait NodeBus: Send + Sync {
    /// Publish on a node's channel; returns how many listeners received it.
    async fn publish(&self, node_id: &str, payload: &str) -> Result<i64, DeliveryError>;

    /// Whether the node's heartbeat is still current.
    async fn is_alive(&self, node_id: &str) -> Result<bool, DeliveryError>;
}

#[axum::async_trait]
impl NodeBus for RedisClient {
    async fn publish(&self, node_id: &str, payload: &str) -> Result<i64, DeliveryError> {
        Ok(RedisClient::publish(self, &node_channel(node_id), payload).await?)
    }

    async fn is_alive(&self, node_id: &str) -> Result<bool, DeliveryError> {
        Ok(self.exists(&node_alive_key(node_id)).await?)
    }
}

/// Relay for multi-process deployments. Handles owned by this node go straight
/// to the local hub; others are published on the owning node's channel, where
/// that node's [`run_node_listener`] picks them up.
pub struct RedisRelay {
    node_id: String,
    hub: Arc<ConnectionHub>,
    bus: Arc<dyn NodeBus>,
}

impl RedisRelay {
    pub fn new(node_id: impl Into<String>, hub: Arc<ConnectionHub>, bus: Arc<dyn NodeBus>) -> Self {
        Self {
            node_id: node_id.into(),
            hub,
            bus,
        }
    }
}

#[axum::async_trait]
impl Relay for RedisRelay {
    /// Nobody listening on a live node's channel means its listener is
    /// reconnecting: the delivery fails but the handle stays registered. Only
    /// a node whose heartbeat has expired is reported as gone.
    async fn forward(&self, handle: &ConnectionHandle, event: &DeliveryEvent) -> Result<(), DeliveryError> {
        if handle.node_id == self.node_id {
            return self.hub.deliver(handle.connection_id, event.clone());
        }

        let envelope = RelayEnvelope {
            connection_id: handle.connection_id,
            event: event.clone(),
        };
        let payload = serde_json::to_string(&envelope)?;

        if self.bus.publish(&handle.node_id, &payload).await? > 0 {
            return Ok(());
        }

        if self.bus.is_alive(&handle.node_id).await? {
            Err(DeliveryError::NodeUnreachable(handle.node_id.clone()))
        } else {
            Err(DeliveryError::NodeGone(handle.node_id.clone()))
        }
    }
}

/// Hand one relayed payload to the local hub.
pub fn deliver_envelope(hub: &ConnectionHub, payload: &str) -> Result<(), DeliveryError> {
    let envelope: RelayEnvelope = serde_json::from_str(payload)?;
    hub.deliver(envelope.connection_id, envelope.event)
}

/// Delay between listener reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectBackoff {
    /// Delay after `failures` consecutive failed attempts.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(failures));
        delay.min(self.max_delay)
    }
}

/// Keep this node subscribed to its relay channel for the life of the process.
///
/// The pub/sub connection is not reconnect-managed, so whenever the
/// subscription fails or its stream ends the listener resubscribes after a
/// backoff. The delay resets once a subscription has been established.
pub async fn run_node_listener(redis: RedisClient, node_id: String, hub: Arc<ConnectionHub>) {
    let channel = node_channel(&node_id);
    let backoff = ReconnectBackoff::default();
    let mut failures = 0u32;

    loop {
        match listen_once(&redis, &channel, &hub).await {
            Ok(()) => {
                failures = 0;
                tracing::error!(channel = %channel, "relay listener stream ended, resubscribing");
            }
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, failures, "relay listener failed");
            }
        }

        let delay = backoff.delay_for(failures);
        failures = failures.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}

async fn listen_once(redis: &RedisClient, channel: &str, hub: &ConnectionHub) -> Result<(), redis::RedisError> {
    let mut pubsub = redis.pubsub().await?;
    pubsub.subscribe(channel).await?;

    tracing::info!(channel = %channel, "relay listener subscribed");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to read relay payload");
                continue;
            }
        };

        if let Err(e) = deliver_envelope(hub, &payload) {
            tracing::warn!(error = %e, "relayed event dropped");
        }
    }

    Ok(())
}

/// Refresh this node's liveness key so peers can tell a reconnecting listener
/// from a dead process.
pub async fn run_node_heartbeat(redis: RedisClient, node_id: String) {
    let key = node_alive_key(&node_id);
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        ticker.tick().await;
        if let Err(e) = redis.set_with_ttl(&key, "1", HEARTBEAT_TTL_SECS).await {
            tracing::warn!(node_id = %node_id, error = %e, "failed to refresh node heartbeat");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use crate::delivery::DeliveryChannel;
    use crate::presence::{GroupKey, LocalPresence, PresenceRegistry};

    fn event(message: &str) -> DeliveryEvent {
        DeliveryEvent::Notification { message: message.into() }
    }

    /// Broker stand-in. Nodes with a hub here have a working listener; the
    /// rest are alive or dead according to `alive`.
    #[derive(Default)]
    struct FakeBus {
        listeners: HashMap<String, Arc<ConnectionHub>>,
        alive: HashSet<String>,
        published: Mutex<Vec<(String, String)>>,
    }

    #[axum::async_trait]
    impl NodeBus for FakeBus {
        async fn publish(&self, node_id: &str, payload: &str) -> Result<i64, DeliveryError> {
            self.published.lock().unwrap().push((node_id.to_string(), payload.to_string()));
            match self.listeners.get(node_id) {
                Some(hub) => {
                    let _ = deliver_envelope(hub, payload);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        async fn is_alive(&self, node_id: &str) -> Result<bool, DeliveryError> {
            Ok(self.listeners.contains_key(node_id) || self.alive.contains(node_id))
        }
    }

    #[tokio::test]
    async fn local_relay_rejects_foreign_handles() {
        let hub = Arc::new(ConnectionHub::new());
        let relay = LocalRelay::new("n1", hub.clone());
        let id = Uuid::new_v4();
        let _rx = hub.register(id);

        assert!(relay.forward(&ConnectionHandle::new("n1", id), &event("m")).await.is_ok());
        let err = relay.forward(&ConnectionHandle::new("n2", id), &event("m")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NodeGone(node) if node == "n2"));
    }

    #[tokio::test]
    async fn own_handles_skip_the_broker() {
        let hub = Arc::new(ConnectionHub::new());
        let bus = Arc::new(FakeBus::default());
        let relay = RedisRelay::new("n1", hub.clone(), bus.clone());
        let id = Uuid::new_v4();
        let mut rx = hub.register(id);

        relay.forward(&ConnectionHandle::new("n1", id), &event("local")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event("local"));
        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_handles_are_published_to_their_node() {
        let hub_a = Arc::new(ConnectionHub::new());
        let hub_b = Arc::new(ConnectionHub::new());
        let bus = Arc::new(FakeBus {
            listeners: HashMap::from([("n2".to_string(), hub_b.clone())]),
            ..FakeBus::default()
        });
        let relay = RedisRelay::new("n1", hub_a.clone(), bus.clone());
        let id = Uuid::new_v4();
        let mut rx = hub_b.register(id);

        relay.forward(&ConnectionHandle::new("n2", id), &event("cross-node")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event("cross-node"));
        let published = bus.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "n2");
        assert!(hub_a.is_empty());
    }

    #[tokio::test]
    async fn reconnecting_node_keeps_its_presence() {
        let presence = Arc::new(LocalPresence::new());
        let bus = Arc::new(FakeBus {
            alive: HashSet::from(["n2".to_string()]),
            ..FakeBus::default()
        });
        let relay = Arc::new(RedisRelay::new("n1", Arc::new(ConnectionHub::new()), bus));
        let channel = DeliveryChannel::new(presence.clone(), relay);
        let group = GroupKey::for_user(Uuid::new_v4());
        let handle = ConnectionHandle::new("n2", Uuid::new_v4());
        presence.join(&group, &handle).await.unwrap();

        assert_eq!(channel.publish(&group, event("while reconnecting")).await, 0);
        assert_eq!(presence.members(&group).await.unwrap(), HashSet::from([handle]));
    }

    #[tokio::test]
    async fn dead_node_handles_are_pruned() {
        let presence = Arc::new(LocalPresence::new());
        let relay = Arc::new(RedisRelay::new("n1", Arc::new(ConnectionHub::new()), Arc::new(FakeBus::default())));
        let channel = DeliveryChannel::new(presence.clone(), relay);
        let group = GroupKey::for_user(Uuid::new_v4());
        presence.join(&group, &ConnectionHandle::new("crashed", Uuid::new_v4())).await.unwrap();

        assert_eq!(channel.publish(&group, event("too late")).await, 0);
        assert!(presence.members(&group).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn envelopes_reach_the_addressed_mailbox() {
        let hub = ConnectionHub::new();
        let id = Uuid::new_v4();
        let mut rx = hub.register(id);
        let payload = serde_json::to_string(&RelayEnvelope { connection_id: id, event: event("relayed") }).unwrap();

        deliver_envelope(&hub, &payload).unwrap();
        assert_eq!(rx.recv().await.unwrap(), event("relayed"));

        assert!(matches!(deliver_envelope(&hub, "not json"), Err(DeliveryError::Codec(_))));
        let stray = serde_json::to_string(&RelayEnvelope { connection_id: Uuid::new_v4(), event: event("x") }).unwrap();
        assert!(matches!(deliver_envelope(&hub, &stray), Err(DeliveryError::ConnectionGone(_))));
    }

    #[test]
    fn envelope_wire_shape() {
        let id = Uuid::new_v4();
        let envelope = RelayEnvelope {
            connection_id: id,
            event: event("hey"),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "connection_id": id, "event": "notification", "message": "hey" })
        );
    }

    #[test]
    fn reconnect_backoff_doubles_up_to_the_cap() {
        let backoff = ReconnectBackoff::default();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn node_keys_are_namespaced() {
        assert_eq!(node_channel("web-1"), "vidhub:node:web-1");
        assert_eq!(node_alive_key("web-1"), "vidhub:node-alive:web-1");
    }
}
